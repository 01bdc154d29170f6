//! End-to-end scenarios exercising the dynamically-scaling worker pool
//! against the real `regex_executor` subprocess.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex_relay_pool::config::{ExecutorSpec, PoolConfig};
use regex_relay_pool::core::{
    ChainLimits, RecordingReplySender, SubstitutionCommand, SubstitutionOrchestrator, Task, TaskErrorKind, TaskResult, WorkerPool,
};

fn executor_spec() -> ExecutorSpec {
    ExecutorSpec::Path { program: PathBuf::from(env!("CARGO_BIN_EXE_regex_executor")), args: Vec::new() }
}

fn config(overrides: impl FnOnce(PoolConfig) -> PoolConfig) -> PoolConfig {
    overrides(PoolConfig { executor_spec: executor_spec(), task_timeout_ms: 2_000, idle_check_interval_ms: 100, ..PoolConfig::default() })
}

fn task(text: &str, pattern: &str, replacement: &str) -> Task {
    task_with_timeout(text, pattern, replacement, Duration::from_secs(5))
}

fn task_with_timeout(text: &str, pattern: &str, replacement: &str, timeout: Duration) -> Task {
    Task::new(text, SubstitutionCommand::new(pattern, "", replacement), false, timeout)
}

/// Spawn each task concurrently on the runtime (rather than awaiting them one
/// at a time), so scale-up scenarios actually see simultaneous demand.
async fn run_concurrently(pool: &Arc<WorkerPool>, tasks: Vec<Task>) -> Vec<Result<TaskResult, regex_relay_pool::core::SubmitError>> {
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|t| {
            let pool = Arc::clone(pool);
            tokio::spawn(async move { pool.run(t).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("task should not panic"));
    }
    results
}

#[tokio::test]
async fn basic_substitution_round_trips_through_a_real_subprocess() {
    let pool = WorkerPool::new(config(|c| c)).expect("valid config");
    let result = pool.run(task("hello world", "world", "Rust")).await.unwrap();
    match result {
        TaskResult::Ok { text, .. } => assert_eq!(text, "hello Rust"),
        TaskResult::Err(e) => panic!("unexpected failure: {e}"),
    }
    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn scales_up_workers_under_concurrent_load() {
    let pool = Arc::new(WorkerPool::new(config(|c| PoolConfig { min_workers: 1, max_workers: 4, initial_workers: 1, ..c })).expect("valid config"));

    let tasks = (0..8).map(|i| task(&format!("item-{i}"), "item", "thing")).collect();
    let results = run_concurrently(&pool, tasks).await;
    assert!(results.iter().all(Result::is_ok));

    let stats = pool.stats();
    assert!(stats.total_workers > 1, "pool should have scaled past its single initial worker, got {}", stats.total_workers);

    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn scales_down_to_the_floor_once_idle() {
    let pool = Arc::new(
        WorkerPool::new(config(|c| PoolConfig {
            min_workers: 1,
            max_workers: 4,
            initial_workers: 1,
            idle_timeout_ms: 50,
            idle_check_interval_ms: 30,
            ..c
        }))
        .expect("valid config"),
    );

    let tasks = (0..6).map(|i| task(&format!("x{i}"), "x", "y")).collect();
    let _ = run_concurrently(&pool, tasks).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = pool.stats();
    assert_eq!(stats.total_workers, 1, "pool should have scaled back down to min_workers, got {}", stats.total_workers);

    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn catastrophic_backtracking_is_killed_at_its_deadline() {
    let pool = WorkerPool::new(config(|c| PoolConfig { task_timeout_ms: 300, ..c })).expect("valid config");

    // (a+)+$b against a run of 'a's with no trailing 'b' forces exponential backtracking.
    let adversarial_text = "a".repeat(40);
    let t = task_with_timeout(&adversarial_text, r"(a+)+$b", "x", Duration::from_millis(300));
    let result = pool.run(t).await.unwrap();
    assert!(matches!(result, TaskResult::Err(TaskErrorKind::Timeout)), "expected a timeout, got {result:?}");

    // The pool must still be usable afterwards: one worker's timeout never
    // poisons the pool for later tasks.
    let result = pool.run(task("hello", "hello", "hi")).await.unwrap();
    assert!(matches!(result, TaskResult::Ok { .. }));

    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn invalid_regex_fails_without_affecting_the_pool() {
    let pool = WorkerPool::new(config(|c| c)).expect("valid config");

    let result = pool.run(task("anything", "[unclosed", "x")).await.unwrap();
    assert!(matches!(result, TaskResult::Err(TaskErrorKind::InvalidRegex(_))));

    let result = pool.run(task("hello", "hello", "hi")).await.unwrap();
    assert!(matches!(result, TaskResult::Ok { .. }));

    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn draining_shutdown_exceeds_the_worker_ceiling_to_clear_the_backlog() {
    let pool = Arc::new(
        WorkerPool::new(config(|c| PoolConfig { min_workers: 1, max_workers: 2, initial_workers: 1, drain_surge_cap: 20, ..c }))
            .expect("valid config"),
    );

    let tasks = (0..10).map(|i| task(&format!("d{i}"), "d", "e")).collect();
    let run_future = run_concurrently(&pool, tasks);

    // Shut down with draining concurrently with the still-in-flight
    // submissions: the surge should still let every one of them resolve.
    let shutdown_pool = Arc::clone(&pool);
    let shutdown_future = async move { shutdown_pool.shutdown(true, Duration::from_secs(5)).await };

    let (results, ()) = tokio::join!(run_future, shutdown_future);
    assert!(results.iter().all(|r| matches!(r, Ok(TaskResult::Ok { .. }))), "drain should finish all queued work: {results:?}");
}

#[tokio::test]
async fn orchestrator_truncates_final_output_and_delivers_it_once() {
    let pool = WorkerPool::new(config(|c| c)).expect("valid config");
    let orchestrator = SubstitutionOrchestrator::new(&pool, ChainLimits { max_message_length: 4, max_chain_length: 10 });
    let commands = vec![("o".to_string(), "g".to_string(), "0".to_string())];
    let sender = RecordingReplySender::new();

    let outcome = orchestrator
        .run_chain("foo boo", &commands, Duration::from_secs(2), &sender, "target-1", false)
        .await
        .expect("chain should resolve");

    assert_eq!(outcome.text.chars().count(), 4);
    let sent = sender.sent.lock();
    assert_eq!(sent.len(), 1, "the chain must deliver exactly one reply");
    assert_eq!(sent[0].0, "target-1");
    assert_eq!(sent[0].1, outcome.text);
    assert!(!sent[0].2);

    pool.shutdown(false, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn orchestrator_turns_on_chain_wide_performance_from_any_step_marker() {
    let pool = WorkerPool::new(config(|c| c)).expect("valid config");
    let orchestrator = SubstitutionOrchestrator::new(&pool, ChainLimits::default());
    // The performance marker sits only on the second step's flags; every
    // step's task must still be submitted with `include_performance = true`,
    // and the chain as a whole must report a wall-clock timing line.
    let commands = vec![("a".to_string(), String::new(), String::new()), ("b".to_string(), "p".to_string(), String::new())];
    let sender = RecordingReplySender::new();

    let outcome = orchestrator
        .run_chain("abc", &commands, Duration::from_secs(2), &sender, "target-2", true)
        .await
        .expect("chain should resolve");

    assert_eq!(outcome.text, "c");
    assert!(outcome.total_performance_ms.is_some());
    assert!(outcome.timing_line.is_some());
    let sent = sender.sent.lock();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("ms"));
    assert!(sent[0].2);

    pool.shutdown(false, Duration::from_secs(5)).await;
}

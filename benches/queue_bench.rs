//! Benchmarks for the dynamically-scaling worker pool.
//!
//! Covers:
//! - Single-task dispatch latency through a real executor subprocess
//! - Throughput submitting a burst of tasks against a fixed-size pool
//! - Pool construction and teardown cost

use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use regex_relay_pool::config::{ExecutorSpec, PoolConfig};
use regex_relay_pool::core::{SubstitutionCommand, Task, WorkerPool};

fn executor_spec() -> ExecutorSpec {
    ExecutorSpec::Path { program: PathBuf::from(env!("CARGO_BIN_EXE_regex_executor")), args: Vec::new() }
}

fn base_config(max_workers: usize, initial_workers: usize) -> PoolConfig {
    PoolConfig {
        executor_spec: executor_spec(),
        min_workers: 1,
        max_workers,
        initial_workers,
        task_timeout_ms: 5_000,
        idle_check_interval_ms: 60_000,
        ..PoolConfig::default()
    }
}

fn build_task(i: u64) -> Task {
    Task::new(format!("payload-{i}"), SubstitutionCommand::new("payload", "", "result"), false, Duration::from_secs(5))
}

fn bench_single_task_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_task_round_trip");
    group.bench_function("one_worker", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let pool = WorkerPool::new(base_config(1, 1)).unwrap();
            let result = pool.run(build_task(0)).await.unwrap();
            pool.shutdown(false, Duration::from_secs(5)).await;
            black_box(result);
        });
    });
    group.finish();
}

fn bench_burst_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst_throughput");

    for task_count in [20_u64, 50, 100] {
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(BenchmarkId::from_parameter(task_count), &task_count, |b, &task_count| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let pool = Arc::new(WorkerPool::new(base_config(4, 1)).unwrap());
                let handles: Vec<_> = (0..task_count)
                    .map(|i| {
                        let pool = Arc::clone(&pool);
                        tokio::spawn(async move { pool.run(build_task(i)).await })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
                pool.shutdown(false, Duration::from_secs(5)).await;
            });
        });
    }
    group.finish();
}

fn bench_pool_construction_and_teardown(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_construction_and_teardown");
    group.bench_function("four_initial_workers", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let pool = WorkerPool::new(base_config(4, 4)).unwrap();
            pool.shutdown(false, Duration::from_secs(5)).await;
            black_box(());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_single_task_round_trip, bench_burst_throughput, bench_pool_construction_and_teardown);
criterion_main!(benches);

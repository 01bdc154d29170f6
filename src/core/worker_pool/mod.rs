//! Worker Pool: a single FIFO queue, a dynamic population of worker
//! processes, and four concurrent state transitions (dispatch, completion,
//! timeout, crash), plus idle scale-down and a two-phase graceful shutdown.
//!
//! The pool's own bookkeeping is serialised by funnelling every event
//! (submission, completion, crash, deadline fire, idle tick, shutdown
//! request) through a single dedicated coordinator thread's mailbox — see
//! `coordinator` — rather than by wrapping a shared mutable state in a
//! mutex. This mirrors the specification's "single coordinator thread with
//! an event-loop mailbox" realisation option and is the one this crate
//! picked (see `SPEC_FULL.md` §4.C).

mod coordinator;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::info;

use crate::config::PoolConfig;
use crate::core::error::{PoolConfigError, SubmitError};
use crate::core::health::Verdict;
use crate::core::task::{Task, TaskResult};

use coordinator::{spawn_coordinator, PoolEvent};

/// Monotonic worker identity, assigned once per spawned process and never reused.
pub(crate) type WorkerId = u64;

/// Observability detail for a single worker slot.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    /// This worker's identity.
    pub id: WorkerId,
    /// Whether the worker is currently idle.
    pub idle: bool,
    /// How long (in milliseconds) the worker has been in its current idle/busy state.
    pub state_age_ms: u64,
}

/// A point-in-time snapshot of pool statistics and health, as described in
/// the specification's §4.C observability bullet.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total worker processes currently alive.
    pub total_workers: usize,
    /// Workers currently idle.
    pub idle_count: usize,
    /// Workers currently busy.
    pub busy_count: usize,
    /// Tasks waiting in the FIFO queue.
    pub queue_len: usize,
    /// Tasks dispatched but not yet resolved.
    pub pending_count: usize,
    /// Current three-valued health verdict.
    pub health_verdict: Verdict,
    /// Rolling error rate (0.0-1.0).
    pub error_rate: f64,
    /// Mean successful-task duration in milliseconds, if any successes recorded.
    pub avg_duration_ms: Option<f64>,
    /// `(busy + queue_depth) / max(1, total_workers)`, clamped to 1.
    pub load_factor: f64,
    /// Per-worker detail.
    pub workers: Vec<WorkerInfo>,
}

pub(crate) struct Snapshot {
    pub(crate) stats: PoolStats,
}

/// A dynamically-scaling pool of isolated regex-substitution workers.
pub struct WorkerPool {
    event_tx: Sender<PoolEvent>,
    idle_stop_tx: Mutex<Option<Sender<()>>>,
    coordinator_handle: Mutex<Option<JoinHandle<()>>>,
    snapshot: Arc<RwLock<Snapshot>>,
    shutdown_flag: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Construct a pool: spawns `initial_workers` processes, starts the idle-check timer.
    ///
    /// # Errors
    /// Returns [`PoolConfigError`] if `config` fails validation.
    pub fn new(config: PoolConfig) -> Result<Self, PoolConfigError> {
        config.validate()?;
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(RwLock::new(Snapshot {
            stats: PoolStats {
                total_workers: 0,
                idle_count: 0,
                busy_count: 0,
                queue_len: 0,
                pending_count: 0,
                health_verdict: Verdict::Healthy,
                error_rate: 0.0,
                avg_duration_ms: None,
                load_factor: 0.0,
                workers: Vec::new(),
            },
        }));

        let (event_tx, idle_stop_tx, coordinator_handle) = spawn_coordinator(config, Arc::clone(&snapshot));

        Ok(Self {
            event_tx,
            idle_stop_tx: Mutex::new(Some(idle_stop_tx)),
            coordinator_handle: Mutex::new(Some(coordinator_handle)),
            snapshot,
            shutdown_flag,
        })
    }

    /// Submit a task. Fails immediately with [`SubmitError::ShuttingDown`] if
    /// the pool is shutting down; otherwise the task is enqueued and this
    /// suspends until the completion sink resolves.
    ///
    /// # Errors
    /// Returns [`SubmitError::ShuttingDown`] if the pool has begun shutting down.
    pub async fn run(&self, task: Task) -> Result<TaskResult, SubmitError> {
        if self.shutdown_flag.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        let (sink, receiver) = oneshot::channel();
        if self.event_tx.send(PoolEvent::Submit { task, sink }).is_err() {
            return Err(SubmitError::ShuttingDown);
        }
        receiver.await.map_err(|_| SubmitError::ShuttingDown)
    }

    /// A point-in-time snapshot of pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.snapshot.read().stats.clone()
    }

    /// Per-worker observability detail.
    #[must_use]
    pub fn worker_details(&self) -> Vec<WorkerInfo> {
        self.snapshot.read().stats.workers.clone()
    }

    /// `(busy + queue_depth) / max(1, total_workers)`, clamped to 1.
    #[must_use]
    pub fn load_factor(&self) -> f64 {
        self.snapshot.read().stats.load_factor
    }

    /// Current health verdict, error rate, and average successful duration.
    #[must_use]
    pub fn health(&self) -> (Verdict, f64, Option<f64>) {
        let stats = &self.snapshot.read().stats;
        (stats.health_verdict, stats.error_rate, stats.avg_duration_ms)
    }

    /// Idempotent shutdown. With `drain = false`, every queued submission and
    /// outstanding pending task is rejected immediately and every worker is
    /// stopped. With `drain = true`, the pool temporarily bypasses
    /// `max_workers` to spawn extra capacity and attempts to finish the
    /// current backlog before `drain_timeout` elapses.
    pub async fn shutdown(&self, drain: bool, drain_timeout: Duration) {
        if self.shutdown_flag.swap(true, Ordering::AcqRel) {
            return; // already shutting down or shut down: idempotent no-op.
        }

        // Stop the idle-check timer; it must not keep the process alive past shutdown.
        if let Some(stop_tx) = self.idle_stop_tx.lock().take() {
            drop(stop_tx);
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.event_tx.send(PoolEvent::Shutdown { drain, drain_timeout, done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }

        if let Some(handle) = self.coordinator_handle.lock().take() {
            let _ = handle.join();
        }

        info!("worker pool shutdown complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shutdown_flag.swap(true, Ordering::AcqRel) {
            if let Some(stop_tx) = self.idle_stop_tx.lock().take() {
                drop(stop_tx);
            }
            let (done_tx, _done_rx) = oneshot::channel();
            let _ = self.event_tx.send(PoolEvent::Shutdown { drain: false, drain_timeout: Duration::ZERO, done: done_tx });
            // Deliberately not joined here: Drop must not block. An explicit
            // `shutdown().await` is required to observe full teardown.
        }
    }
}

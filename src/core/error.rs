//! Error types surfaced at pool boundaries.
//!
//! [`crate::core::task::TaskErrorKind`] (the per-task failure taxonomy) travels
//! inside [`crate::core::task::TaskResult`] instead of living here, since it is
//! part of the task data model proper. This module holds the errors that occur
//! around submission, configuration, and executor-process plumbing.

use thiserror::Error;

/// Application-facing result using anyhow for higher-level, internal-only contexts
/// (config-file loading, subprocess plumbing) where callers only need a display string.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Failure submitting a task to the pool.
///
/// Submission itself never fails on capacity — per the specification the
/// queue is unbounded and always accepts work unless the pool is shutting
/// down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The pool is shutting down (or has already drained and shut down) and
    /// rejects the submission immediately.
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Failure validating a [`crate::config::PoolConfig`].
#[derive(Debug, Clone, Error)]
pub enum PoolConfigError {
    /// `max_workers` must be at least 1.
    #[error("max_workers must be >= 1, got {0}")]
    MaxWorkersTooSmall(usize),
    /// `max_workers` must be at least `min_workers`.
    #[error("max_workers ({max_workers}) must be >= min_workers ({min_workers})")]
    MaxBelowMin {
        /// Configured ceiling.
        max_workers: usize,
        /// Configured floor.
        min_workers: usize,
    },
    /// `initial_workers` must fall within `[0, max_workers]`.
    #[error("initial_workers ({initial_workers}) must be <= max_workers ({max_workers})")]
    InitialAboveMax {
        /// Configured eager-spawn count.
        initial_workers: usize,
        /// Configured ceiling.
        max_workers: usize,
    },
    /// A duration field that must be positive was zero.
    #[error("{field} must be > 0")]
    NonPositiveDuration {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Failure spawning or communicating with an executor process.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor process could not be spawned.
    #[error("failed to spawn executor process: {0}")]
    Spawn(#[source] std::io::Error),
    /// Writing the framed request to the executor's stdin failed.
    #[error("failed to write request to executor: {0}")]
    Write(#[source] std::io::Error),
    /// Reading the framed response from the executor's stdout failed.
    #[error("failed to read response from executor: {0}")]
    Read(#[source] std::io::Error),
    /// The response could not be parsed.
    #[error("malformed executor response: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The executor process exited before producing a response.
    #[error("executor process exited unexpectedly")]
    ProcessExited,
}

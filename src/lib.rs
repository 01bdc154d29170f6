//! # Regex Relay Pool
//!
//! A dynamically-scaling worker pool that applies chains of regex
//! substitutions under a hard per-task timeout, with backpressure,
//! partial-failure isolation, and a two-phase graceful shutdown.
//!
//! ## Core Problem Solved
//!
//! A chat bot that lets users author their own regex substitutions is one
//! user-supplied pattern away from a hung process: catastrophic
//! backtracking on an engine that supports backreferences cannot be
//! interrupted mid-match from the same thread. This crate isolates every
//! substitution in its own OS process so a runaway regex can be killed
//! unilaterally, while still scaling worker capacity up under load and back
//! down when idle.
//!
//! ## Key Features
//!
//! - **Process isolation**: each substitution runs in a dedicated executor
//!   process, killable on deadline, crash, idle scale-down, or shutdown.
//! - **Dynamic scaling**: workers are spawned lazily as the queue backs up
//!   and reclaimed once idle past a configurable age, down to a floor.
//! - **Partial-failure isolation**: one worker's crash or timeout never
//!   affects another's in-flight task.
//! - **Two-phase shutdown**: an immediate mode that rejects outstanding
//!   work, and a draining mode that temporarily exceeds the worker ceiling
//!   to clear the backlog before a deadline.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use regex_relay_pool::config::PoolConfig;
//! use regex_relay_pool::core::{SubstitutionCommand, Task, WorkerPool};
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let pool = WorkerPool::new(PoolConfig::default())?;
//! let command = SubstitutionCommand::new("world", "i", "Rust");
//! let task = Task::new("hello world", command, false, Duration::from_secs(5));
//! let result = pool.run(task).await?;
//! pool.shutdown(true, Duration::from_secs(10)).await;
//! # Ok(())
//! # }
//! ```
//!
//! For complete examples, see `tests/worker_pool_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core substitution-pool abstractions: task model, executor wire contract,
/// the dynamically-scaling worker pool, and the chain-driving orchestrator.
pub mod core;
/// Configuration models for the pool.
pub mod config;
/// Builders to construct a pool and orchestrator from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;

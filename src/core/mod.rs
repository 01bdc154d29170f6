//! Core substitution-pool abstractions: task model, executor wire contract,
//! the dynamically-scaling worker pool, the chain-driving orchestrator, and
//! their supporting collaborators.

pub mod collaborators;
pub mod error;
pub mod executor;
pub mod health;
pub mod orchestrator;
pub mod task;
pub mod worker_pool;

pub use collaborators::{HeuristicPatternAdvisor, InMemoryMessageStore, MessageStore, PatternAdvisor, PatternDetection, PatternIssue, RecordingReplySender, ReplySender};
pub use error::{AppResult, ExecutorError, PoolConfigError, SubmitError};
pub use executor::{ExecutorRequest, ExecutorResponse, WireCommand};
pub use health::{HealthMetrics, HealthMonitor, HealthThresholds, Verdict};
pub use orchestrator::{ChainError, ChainLimits, ChainOutcome, SubstitutionOrchestrator};
pub use task::{RegexFlag, RegexFlags, SubstitutionCommand, Task, TaskErrorKind, TaskResult};
pub use worker_pool::{PoolStats, WorkerInfo, WorkerPool};

//! Builders to construct a pool and orchestrator from configuration.

pub mod pool_builder;

pub use pool_builder::{build_orchestrator, build_pool};

//! Builders to construct a worker pool and its orchestrator from configuration.

use crate::config::PoolConfig;
use crate::core::{ChainLimits, PoolConfigError, SubstitutionOrchestrator, WorkerPool};

/// Build a [`WorkerPool`] from `config`, applying environment-variable
/// overrides first via [`PoolConfig::with_env_overrides`].
///
/// # Errors
/// Returns [`PoolConfigError`] if the overlaid configuration fails validation.
pub fn build_pool(config: PoolConfig) -> Result<WorkerPool, PoolConfigError> {
    WorkerPool::new(config.with_env_overrides())
}

/// Build a [`SubstitutionOrchestrator`] over an already-constructed `pool`,
/// using `limits` to bound chain length and message size.
#[must_use]
pub fn build_orchestrator(pool: &WorkerPool, limits: ChainLimits) -> SubstitutionOrchestrator<'_> {
    SubstitutionOrchestrator::new(pool, limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_pool_rejects_invalid_config() {
        let cfg = PoolConfig { max_workers: 0, ..PoolConfig::default() };
        assert!(build_pool(cfg).is_err());
    }
}

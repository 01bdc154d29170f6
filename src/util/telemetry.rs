//! Telemetry helpers for structured logging.

/// Install a default env-filtered `tracing` subscriber if the caller hasn't
/// already installed one. Safe to call multiple times.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

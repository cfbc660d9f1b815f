//! Tracing/logging initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// `default_level` is used when `RUST_LOG`/`REGISTRY_LOG_LEVEL` is unset.
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initialize tracing using `RegistryConfig::log_level` as the default.
pub fn init_tracing_from_config(config: &crate::config::RegistryConfig) {
    init_tracing(&config.log_level);
}

//! Environment-driven configuration for the registry and its binaries.

use std::env;
use std::time::Duration;

/// Top-level runtime configuration, populated from environment variables.
///
/// Mirrors the persistent state / environment layout described for the
/// registry: a handful of connection settings plus the resource bounds that
/// govern the concurrency model.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Database host (informational; storage backend choice is external).
    pub db_host: String,
    /// Database port.
    pub db_port: u16,
    /// Database name.
    pub db_name: String,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Directory holding persistent config, including the encryption key.
    pub config_dir: String,
    /// Log level passed to `telemetry::init_tracing`.
    pub log_level: String,

    /// Maximum number of concurrent streams.
    pub max_parallel_streams: usize,
    /// Maximum number of in-flight propagation sessions.
    pub max_inflight_propagation_sessions: usize,
    /// Maximum buffered messages per subscriber inbox.
    pub max_subscriber_inbox: usize,
    /// Maximum entries retained in the read-through cache.
    pub max_cache_entries: usize,
    /// Maximum retained historical keys in the crypto key ring.
    pub max_key_ring_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_name: "hyperreg".to_string(),
            db_user: "hyperreg".to_string(),
            db_password: String::new(),
            config_dir: "./.hyperreg".to_string(),
            log_level: "info".to_string(),
            max_parallel_streams: 10_000,
            max_inflight_propagation_sessions: 1_000,
            max_subscriber_inbox: 1_024,
            max_cache_entries: 100_000,
            max_key_ring_depth: 3,
        }
    }
}

impl RegistryConfig {
    /// Build configuration from environment variables, falling back to
    /// [`RegistryConfig::default`] for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_host: env_string("REGISTRY_DB_HOST", &defaults.db_host),
            db_port: env_u16("REGISTRY_DB_PORT", defaults.db_port),
            db_name: env_string("REGISTRY_DB_NAME", &defaults.db_name),
            db_user: env_string("REGISTRY_DB_USER", &defaults.db_user),
            db_password: env_string("REGISTRY_DB_PASSWORD", &defaults.db_password),
            config_dir: env_string("REGISTRY_CONFIG_DIR", &defaults.config_dir),
            log_level: env_string("REGISTRY_LOG_LEVEL", &defaults.log_level),
            max_parallel_streams: env_usize(
                "REGISTRY_MAX_PARALLEL_STREAMS",
                defaults.max_parallel_streams,
            ),
            max_inflight_propagation_sessions: env_usize(
                "REGISTRY_MAX_INFLIGHT_PROPAGATION_SESSIONS",
                defaults.max_inflight_propagation_sessions,
            ),
            max_subscriber_inbox: env_usize(
                "REGISTRY_MAX_SUBSCRIBER_INBOX",
                defaults.max_subscriber_inbox,
            ),
            max_cache_entries: env_usize("REGISTRY_MAX_CACHE_ENTRIES", defaults.max_cache_entries),
            max_key_ring_depth: env_usize(
                "REGISTRY_MAX_KEY_RING_DEPTH",
                defaults.max_key_ring_depth,
            ),
        }
    }

    /// Path to the persisted symmetric encryption key.
    pub fn encryption_key_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.config_dir).join("encryption.key")
    }
}

/// Read a string environment variable, falling back to `default` if unset.
pub fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a `u16` environment variable, falling back to `default` if unset or
/// unparsable.
pub fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a `usize` environment variable, falling back to `default` if unset
/// or unparsable.
pub fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a `bool` environment variable (`"1"`/`"true"`/`"yes"` are truthy),
/// falling back to `default` if unset.
pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Read a `Duration` (seconds) environment variable, falling back to
/// `default` if unset or unparsable.
pub fn env_duration_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

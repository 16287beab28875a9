//! Service configuration.

use tutor_core::DEFAULT_MAX_BALANCE;
use tutor_store::EngineOptions;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/tutor").
    pub data_dir: String,

    /// Service API key required on mutating routes.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Highest credit balance a user may hold.
    pub max_balance: i64,

    /// Row lock wait before a transaction gives up, in milliseconds.
    pub lock_timeout_ms: i64,

    /// Period of the background maintenance job (reconciliation and completion).
    pub reconcile_interval_seconds: u64,

    /// Whether the background maintenance job runs at all.
    pub reconcile_enabled: bool,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/tutor".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 1024 * 1024),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", 30),
            max_balance: env_parse("MAX_BALANCE", DEFAULT_MAX_BALANCE),
            lock_timeout_ms: env_parse("LOCK_TIMEOUT_MS", 2_000),
            reconcile_interval_seconds: env_parse("RECONCILE_INTERVAL_SECONDS", 30 * 60),
            reconcile_enabled: env_parse("RECONCILE_ENABLED", true),
        }
    }

    /// Store options derived from this configuration.
    #[must_use]
    pub const fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_balance: self.max_balance,
            lock_timeout_ms: self.lock_timeout_ms,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/tutor".into(),
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            max_balance: DEFAULT_MAX_BALANCE,
            lock_timeout_ms: 2_000,
            reconcile_interval_seconds: 30 * 60,
            reconcile_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.engine_options(), EngineOptions::default());
        assert_eq!(config.reconcile_interval_seconds, 1800);
        assert!(config.reconcile_enabled);
    }
}

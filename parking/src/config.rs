//! Configuration management for EasyPark.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binary loads a `.env` file first, so the same variables can live there.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend configuration
    pub storage: StorageConfig,
    /// Service behaviour
    pub service: ServiceConfig,
    /// Session configuration
    pub auth: AuthConfig,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one file per storage key
    pub data_dir: PathBuf,
    /// Namespace prepended to every storage key
    pub key_prefix: String,
}

/// Service behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Artificial delay applied to every service call, in milliseconds
    pub simulated_latency_ms: u64,
    /// Reservation code draws before giving up on a unique one
    pub code_attempts: usize,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in seconds (default: 1 day)
    pub session_ttl: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: env::var("EASYPARK_DATA_DIR")
                    .map_or_else(|_| PathBuf::from("./.easypark"), PathBuf::from),
                key_prefix: env::var("EASYPARK_KEY_PREFIX")
                    .ok()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| "easypark".to_string()),
            },
            service: ServiceConfig {
                simulated_latency_ms: env::var("EASYPARK_SIMULATED_LATENCY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                code_attempts: env::var("EASYPARK_CODE_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(32),
            },
            auth: AuthConfig {
                session_ttl: env::var("EASYPARK_SESSION_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(86_400),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Configuration for tests: no latency, default prefix, short sessions
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("./.easypark-test"),
                key_prefix: "easypark".to_string(),
            },
            service: ServiceConfig {
                simulated_latency_ms: 0,
                code_attempts: 32,
            },
            auth: AuthConfig { session_ttl: 3_600 },
            log_level: "warn".to_string(),
        }
    }

    /// Simulated latency as a [`Duration`]
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.service.simulated_latency_ms)
    }

    /// Tracing filter for `log_level`; an unparsable level falls back to `info`
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Session lifetime as a chrono duration, capped at ten years
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        const TEN_YEARS: i64 = 10 * 365 * 86_400;
        let seconds = i64::try_from(self.auth.session_ttl).unwrap_or(TEN_YEARS);
        chrono::Duration::seconds(seconds.min(TEN_YEARS))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_zero_latency() {
        let config = Config::for_tests();
        assert_eq!(config.latency(), Duration::ZERO);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(1));
        assert_eq!(config.storage.key_prefix, "easypark");
    }

    #[test]
    fn test_log_filter_follows_log_level() {
        let mut config = Config::for_tests();
        assert_eq!(config.log_filter().to_string(), "warn");

        config.log_level = "easypark=debug".to_string();
        assert_eq!(config.log_filter().to_string(), "easypark=debug");

        config.log_level = "easypark=loud".to_string();
        assert_eq!(config.log_filter().to_string(), "info");
    }
}

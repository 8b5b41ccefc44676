//! Configuration module for pacer
//!
//! Layered configuration loading from files, environment variables, and
//! defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`PACER_*`)
//! 2. Configuration file (TOML)
//! 3. Default values
//!
//! # Example
//!
//! ```rust
//! use pacer::config::PacerConfig;
//!
//! // Load defaults
//! let config = PacerConfig::default();
//! assert_eq!(config.budget.tokens_per_minute, 90_000);
//!
//! // Parse from TOML
//! let toml = r#"
//! [budget]
//! tokens_per_minute = 50000
//! "#;
//! let config: PacerConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.budget.tokens_per_minute, 50_000);
//! ```

pub mod budget;
pub mod cache;
pub mod error;
pub mod logging;
pub mod queue;
pub mod retry;

pub use budget::BudgetConfig;
pub use cache::CacheConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use queue::QueueConfig;
pub use retry::RetryConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PacerConfig {
    /// Global token budget and watchdog settings
    pub budget: BudgetConfig,
    /// Tenant queue and reaper settings
    pub queue: QueueConfig,
    /// Provider-call retry policy
    pub retry: RetryConfig,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl PacerConfig {
    /// Load configuration from a TOML file.
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supports PACER_* environment variables for common settings.
    /// Invalid values are silently ignored (previous values are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PACER_TOKENS_PER_MINUTE") {
            if let Ok(n) = v.parse() {
                self.budget.tokens_per_minute = n;
            }
        }
        if let Ok(v) = std::env::var("PACER_WATCHDOG_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.budget.watchdog_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("PACER_MODEL") {
            self.budget.model = v;
        }
        if let Ok(v) = std::env::var("PACER_IDLE_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.queue.idle_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("PACER_TASK_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.queue.task_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("PACER_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.retry.max_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("PACER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("PACER_LOG_FORMAT") {
            if let Ok(f) = v.parse() {
                self.logging.format = f;
            }
        }
        self
    }

    /// Sanity-check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.tokens_per_minute == 0 {
            return Err(ConfigError::Validation {
                field: "budget.tokens_per_minute".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.budget.watchdog_timeout_seconds <= self.queue.task_timeout_seconds {
            return Err(ConfigError::Validation {
                field: "budget.watchdog_timeout_seconds".to_string(),
                message: format!(
                    "must exceed queue.task_timeout_seconds ({})",
                    self.queue.task_timeout_seconds
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PacerConfig::default();
        assert_eq!(config.budget.tokens_per_minute, 90_000);
        assert_eq!(config.budget.watchdog_timeout_seconds, 120);
        assert_eq!(config.budget.admission_poll_ms, 500);
        assert_eq!(config.budget.model, "gpt-4.1-nano");
        assert_eq!(config.queue.idle_timeout_seconds, 600);
        assert_eq!(config.queue.reap_interval_seconds, 60);
        assert_eq!(config.queue.task_timeout_seconds, 90);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.retry.exponential_backoff);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let toml = r#"
            [budget]
            tokens_per_minute = 50000

            [retry]
            max_attempts = 3
        "#;
        let config: PacerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.budget.tokens_per_minute, 50_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.queue.idle_timeout_seconds, 600);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\ntask_timeout_seconds = 30").unwrap();
        let config = PacerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.queue.task_timeout_seconds, 30);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let result = PacerConfig::load(Some(Path::new("/nonexistent/pacer.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn validation_rejects_watchdog_inside_task_timeout() {
        let mut config = PacerConfig::default();
        config.budget.watchdog_timeout_seconds = 30;
        assert!(config.validate().is_err());
    }
}

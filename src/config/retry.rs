//! Retry policy configuration

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the provider-call retry wrapper.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_attempts = 5
/// base_delay_ms = 1000
/// exponential_backoff = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    ///
    /// Default: 5
    pub max_attempts: u32,

    /// Delay before the second attempt.
    ///
    /// Default: 1000 ms
    pub base_delay_ms: u64,

    /// Double the delay after each failed attempt.
    ///
    /// Default: true
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            exponential_backoff: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            exponential_backoff: config.exponential_backoff,
        }
    }
}

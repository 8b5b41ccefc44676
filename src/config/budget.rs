//! Token budget configuration

use serde::{Deserialize, Serialize};

/// Configuration for the global token-budget admission controller.
///
/// # Example
///
/// ```toml
/// [budget]
/// tokens_per_minute = 90000
/// watchdog_timeout_seconds = 120
/// admission_poll_ms = 500
/// model = "gpt-4.1-nano"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Process-wide token throughput ceiling per minute.
    ///
    /// Default: 90000
    pub tokens_per_minute: u32,

    /// Safety deadline after which an unreleased reservation is
    /// force-released by the watchdog.
    ///
    /// Default: 120 seconds. Must exceed the per-task execution timeout or
    /// reservations can be reclaimed out from under live work.
    pub watchdog_timeout_seconds: u64,

    /// Upper bound on how long an admission waiter sleeps before rechecking
    /// the budget. Waiters are also woken immediately on every release.
    ///
    /// Default: 500 ms
    pub admission_poll_ms: u64,

    /// Model identifier used to select the token estimator.
    ///
    /// Default: "gpt-4.1-nano"
    pub model: String,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: 90_000,
            watchdog_timeout_seconds: 120,
            admission_poll_ms: 500,
            model: "gpt-4.1-nano".to_string(),
        }
    }
}

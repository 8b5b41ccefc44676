//! Tenant queue configuration

use serde::{Deserialize, Serialize};

/// Configuration for per-tenant task queues and their reaper.
///
/// # Example
///
/// ```toml
/// [queue]
/// idle_timeout_seconds = 600
/// reap_interval_seconds = 60
/// task_timeout_seconds = 90
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// A queue with no enqueues for this long is removed by the reaper.
    ///
    /// Default: 600 seconds
    pub idle_timeout_seconds: u64,

    /// Fixed tick of the background reaper loop.
    ///
    /// Default: 60 seconds
    pub reap_interval_seconds: u64,

    /// Bounded execution timeout per unit of work. On expiry the result is
    /// discarded and the token reservation released; the timeout is
    /// best-effort, not a hard kill.
    ///
    /// Default: 90 seconds
    pub task_timeout_seconds: u64,

    /// Legacy defensive throttle between dispatches in the consumer loop.
    /// Not required for correctness.
    ///
    /// Default: 0 (disabled)
    pub dispatch_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 600,
            reap_interval_seconds: 60,
            task_timeout_seconds: 90,
            dispatch_delay_ms: 0,
        }
    }
}

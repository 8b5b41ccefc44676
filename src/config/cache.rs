//! Response cache configuration

use serde::{Deserialize, Serialize};

/// Configuration for the content-addressed response cache.
///
/// # Example
///
/// ```toml
/// [cache]
/// enabled = true
/// max_entries = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether responses are memoized at all.
    ///
    /// Default: true
    pub enabled: bool,

    /// Upper bound on cached entries; least-recently-used entries are
    /// evicted past this point.
    ///
    /// Default: 10000
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

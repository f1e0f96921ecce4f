//! Cache configuration and defaults.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Configuration for [`super::ResultCache`] sizing and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before oldest-write eviction (default: 128).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Default TTL in milliseconds for entries stored without an explicit
    /// TTL (default: 300000, five minutes).
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Snapshot file for durable persistence. `None` disables snapshotting
    /// and the cache is purely in-memory.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_max_entries() -> usize {
    128
}

fn default_ttl_ms() -> u64 {
    300_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_ms: default_ttl_ms(),
            snapshot_path: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

//! TTL-bounded result cache with oldest-write eviction and durable
//! snapshotting.
//!
//! Expiry is checked lazily on read rather than by a background sweep,
//! trading a little memory bloat from expired-but-unread entries for zero
//! background scheduling. Eviction is an O(n) oldest-write scan, acceptable
//! at the configured store sizes; the external contract would survive an
//! upgrade to a proper LRU structure.
//!
//! All mutations run under one internal lock, and eviction plus snapshot
//! persistence happen inside the same critical section as the triggering
//! mutation so concurrent diagnoses cannot interleave a lost update.

pub mod config;
pub mod persistence;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use config::CacheConfig;
pub use persistence::SnapshotError;

/// One cached value with its write timestamp and TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        age > chrono::Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX))
    }
}

/// Call-time cache diagnostics.
///
/// `valid`/`expired` are computed against current TTLs when requested, not
/// maintained incrementally.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub approx_byte_size: usize,
}

/// Key-value store with per-entry TTL, bounded size, pattern invalidation,
/// and best-effort disk snapshotting.
pub struct ResultCache {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    /// Creates a cache, restoring the snapshot when one is configured and
    /// readable. An unreadable or corrupt snapshot is discarded and the
    /// cache starts cold; every value is re-derivable from upstream.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let entries = match &config.snapshot_path {
            Some(path) => match persistence::load(path) {
                Ok(entries) => {
                    info!(entries = entries.len(), path = %path.display(), "restored cache snapshot");
                    entries
                }
                Err(err) if err.is_not_found() => HashMap::new(),
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "discarding unreadable cache snapshot, starting cold");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        Self { config, entries: Mutex::new(entries) }
    }

    /// Returns the cached value if present and unexpired. An expired entry
    /// found during the check is deleted as a side effect.
    ///
    /// A value that no longer deserializes to `T` is treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();

        match entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(Utc::now()) => {
                return match serde_json::from_value(entry.data.clone()) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(key = %key, error = %err, "cached value failed to deserialize, treating as miss");
                        None
                    }
                };
            }
            Some(_) => {}
        }

        debug!(key = %key, "evicting expired cache entry on read");
        entries.remove(key);
        self.persist_locked(&entries);
        None
    }

    /// Stores a value with write timestamp = now.
    ///
    /// When inserting a new key at capacity, the single entry with the
    /// oldest write timestamp is evicted first. A value that fails to
    /// serialize is not cached; the caller is never failed.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<std::time::Duration>) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key = %key, error = %err, "value failed to serialize, not caching");
                return;
            }
        };
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let mut entries = self.entries.lock();

        if !entries.contains_key(key) && entries.len() >= self.config.max_entries {
            self.evict_oldest_locked(&mut entries);
        }

        entries.insert(key.to_string(), CacheEntry { data, stored_at: Utc::now(), ttl_ms });
        self.persist_locked(&entries);
    }

    /// Removes one entry if present.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist_locked(&entries);
        }
    }

    /// Removes every entry whose key matches the pattern. Used to cascade
    /// invalidation across related namespaces.
    pub fn invalidate_pattern(&self, pattern: &Regex) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(pattern = %pattern, removed = removed, "pattern invalidation removed entries");
            self.persist_locked(&entries);
        }
    }

    /// Removes everything and erases the durable snapshot.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        if let Some(path) = &self.config.snapshot_path {
            if let Err(err) = persistence::remove(path) {
                warn!(error = %err, "failed to erase cache snapshot");
            }
        }
    }

    /// Computes diagnostics over the current entry set.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let now = Utc::now();

        let mut stats = CacheStats { total: entries.len(), ..CacheStats::default() };
        for (key, entry) in entries.iter() {
            if entry.is_expired(now) {
                stats.expired += 1;
            } else {
                stats.valid += 1;
            }
            stats.approx_byte_size += key.len() +
                serde_json::to_string(&entry.data).map_or(0, |json| json.len());
        }
        stats
    }

    /// Evicts the single entry with the smallest write timestamp
    /// (oldest-write, not oldest-access).
    fn evict_oldest_locked(&self, entries: &mut HashMap<String, CacheEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(key = %key, "cache at capacity, evicting oldest entry");
            entries.remove(&key);
        }
    }

    /// Persists the full entry set. Best-effort: failures are logged and
    /// swallowed so a persistence problem never fails the caller's
    /// mutation.
    fn persist_locked(&self, entries: &HashMap<String, CacheEntry>) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        if let Err(err) = persistence::save(path, entries) {
            warn!(error = %err, path = %path.display(), "cache snapshot persistence failed");
        }
    }
}

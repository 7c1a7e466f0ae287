//! Local Cache Module
//!
//! Process-local TTL map used as a short-lived layer in front of (or instead of)
//! the remote cache. Pure and synchronous; never fails.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheStats};
use crate::clock::{system_clock, SharedClock};

// == Local Cache ==
/// String-keyed TTL cache with hit/miss accounting.
///
/// Shared use goes through `Arc<RwLock<LocalCache<V>>>`, which makes each
/// `get` (check, evict or return) and each `set` a single critical section.
#[derive(Debug)]
pub struct LocalCache<V = serde_json::Value> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
    /// TTL used by `set_default`, in milliseconds
    default_ttl_ms: u64,
    clock: SharedClock,
}

impl<V: Clone> LocalCache<V> {
    // == Constructor ==
    /// Creates an empty cache reading the system clock.
    pub fn new(default_ttl_ms: u64) -> Self {
        Self::with_clock(default_ttl_ms, system_clock())
    }

    /// Creates an empty cache driven by the given clock.
    pub fn with_clock(default_ttl_ms: u64, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            default_ttl_ms,
            clock,
        }
    }

    // == Set ==
    /// Stores `value` under `key`, expiring `ttl_ms` from now.
    ///
    /// Any existing entry for `key` is overwritten and its expiry reset.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl_ms: u64) {
        let entry = CacheEntry::new(value, self.clock.now_ms(), ttl_ms);
        self.entries.insert(key.into(), entry);
        self.stats.set_total_entries(self.entries.len());
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set_default(&mut self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl_ms);
    }

    // == Get ==
    /// Returns the live value for `key`.
    ///
    /// Absent and expired keys both count as misses; an expired entry is
    /// removed before returning.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            Some(_) => {
                self.entries.remove(key);
                self.stats.record_expirations(1);
                self.stats.set_total_entries(self.entries.len());
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Remove ==
    /// Drops a single key without touching the counters.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Clear ==
    /// Empties the map. Counters are left as they are.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.set_total_entries(0);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));

        let count = before - self.entries.len();
        self.stats.record_expirations(count);
        self.stats.set_total_entries(self.entries.len());
        count
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Raw presence check: no expiry test, no accounting.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

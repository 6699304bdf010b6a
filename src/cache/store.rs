//! Cache Store Module
//!
//! Single-owner cache engine combining HashMap storage with TTL expiration and
//! a pluggable capacity policy.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::{AccessOrder, CacheEntry, CacheStats};

// == Eviction Policy ==
/// What the store does when a new key arrives at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Evict the entry closest to expiring; entries without TTL go last
    #[default]
    NearestExpiry,
    /// Evict the least recently read or written entry
    LeastRecentlyUsed,
    /// Refuse the new key
    Reject,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::NearestExpiry => "nearest-expiry",
            EvictionPolicy::LeastRecentlyUsed => "lru",
            EvictionPolicy::Reject => "reject",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest-expiry" | "nearest_expiry" | "ttl" => Ok(EvictionPolicy::NearestExpiry),
            "lru" | "least-recently-used" => Ok(EvictionPolicy::LeastRecentlyUsed),
            "reject" | "none" => Ok(EvictionPolicy::Reject),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

// == TTL Store ==
/// Cache storage with TTL expiry and bounded key count.
#[derive(Debug)]
pub struct TtlStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency tracker, consulted by the LRU policy
    access: AccessOrder,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL applied when a set does not specify one; zero disables expiry
    default_ttl: Duration,
    policy: EvictionPolicy,
}

impl<V: Clone> TtlStore<V> {
    // == Constructor ==
    /// Creates a new store with specified capacity, default TTL and capacity policy.
    pub fn new(max_entries: usize, default_ttl: Duration, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            access: AccessOrder::new(),
            stats: CacheStats::new(),
            max_entries,
            default_ttl,
            policy,
        }
    }

    // == Set ==
    /// Stores a value, returning false when no space could be made for it.
    ///
    /// Overwriting an existing key always succeeds and resets its TTL. A new
    /// key at capacity first triggers a purge of expired entries, then one
    /// eviction according to the policy.
    ///
    /// # Arguments
    /// * `ttl` - None uses the default TTL; `Duration::ZERO` never expires
    pub fn set(&mut self, key: String, value: V, ttl: Option<Duration>) -> bool {
        let is_overwrite = self.entries.contains_key(&key);

        if !is_overwrite && self.entries.len() >= self.max_entries && !self.make_room() {
            self.stats.record_rejection();
            return false;
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(value, (!ttl.is_zero()).then_some(ttl));
        self.entries.insert(key.clone(), entry);
        self.access.touch(&key);
        self.stats.set_total_entries(self.entries.len());
        true
    }

    /// Frees at least one slot, returning false if the policy forbids it.
    fn make_room(&mut self) -> bool {
        if self.max_entries == 0 {
            return false;
        }
        if self.purge_expired() > 0 {
            return true;
        }

        let victim = match self.policy {
            EvictionPolicy::Reject => None,
            EvictionPolicy::LeastRecentlyUsed => self.access.least_recent().map(str::to_string),
            EvictionPolicy::NearestExpiry => self
                .entries
                .iter()
                .min_by_key(|(_, entry)| {
                    (entry.expires_at.is_none(), entry.expires_at, entry.created_at)
                })
                .map(|(key, _)| key.clone()),
        };

        match victim {
            Some(key) => {
                self.remove_entry(&key);
                self.stats.record_eviction();
                true
            }
            None => false,
        }
    }

    // == Get ==
    /// Retrieves a live value by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.access.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Has ==
    /// Reports whether a live value exists, without touching stats or recency.
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Delete ==
    /// Removes an entry by key, returning the number of entries removed.
    pub fn delete(&mut self, key: &str) -> usize {
        usize::from(self.remove_entry(key))
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.access.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Flush ==
    /// Drops every entry and resets all counters.
    pub fn flush(&mut self) {
        self.entries.clear();
        self.access.clear();
        self.stats = CacheStats::new();
    }

    // == Purge Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }
        expired_keys.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

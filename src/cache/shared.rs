//! Shared Response Cache
//!
//! Cloneable, task-safe handle over a [`TtlStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheStats, EvictionPolicy, TtlStore};
use crate::config::CacheConfig;

// == Response Cache ==
/// Process-wide cache shared by every executor clone.
///
/// All mutation goes through this handle. Concurrent identical populations
/// are allowed to race; the last writer wins.
#[derive(Debug)]
pub struct ResponseCache<V> {
    store: Arc<RwLock<TtlStore<V>>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    /// Creates a cache around a fresh store.
    pub fn new(max_entries: usize, default_ttl: Duration, policy: EvictionPolicy) -> Self {
        Self {
            store: Arc::new(RwLock::new(TtlStore::new(max_entries, default_ttl, policy))),
        }
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.default_ttl, config.eviction)
    }

    // == Get ==
    /// Returns the live value for `key`, recording a hit or miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        // Write lock: a read updates recency and counters
        self.store.write().await.get(key)
    }

    // == Set ==
    /// Stores a value; false means the cache silently stayed unpopulated.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let stored = self.store.write().await.set(key.clone(), value, ttl);
        if !stored {
            debug!(key = %key, "Cache full, value not stored");
        }
        stored
    }

    pub async fn delete(&self, key: &str) -> usize {
        self.store.write().await.delete(key)
    }

    pub async fn has(&self, key: &str) -> bool {
        self.store.read().await.has(key)
    }

    // == Get Or Compute ==
    /// Returns the cached value or computes, caches and returns a fresh one.
    ///
    /// The supplier runs at most once per call and without the lock held.
    /// Its errors are returned as-is and never cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        supplier: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = supplier().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }

    // == Flush ==
    /// Clears all entries and resets counters.
    pub async fn flush(&self) {
        self.store.write().await.flush();
    }

    /// Physically removes expired entries, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        self.store.write().await.purge_expired()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

//! Access Order Module
//!
//! Tracks key recency for least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};

// == Access Order ==
/// Orders keys by their last access.
///
/// Every touch stamps the key with a monotonically increasing tick; the
/// smallest tick is the least recently used key.
#[derive(Debug, Default)]
pub struct AccessOrder {
    /// Tick -> key, ordered oldest first
    by_tick: BTreeMap<u64, String>,
    /// Key -> its current tick
    ticks: HashMap<String, u64>,
    next_tick: u64,
}

impl AccessOrder {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;

        if let Some(old) = self.ticks.insert(key.to_string(), tick) {
            self.by_tick.remove(&old);
        }
        self.by_tick.insert(tick, key.to_string());
    }

    // == Remove ==
    /// Stops tracking a key.
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    // == Least Recent ==
    /// Returns the least recently used key without removing it.
    pub fn least_recent(&self) -> Option<&str> {
        self.by_tick.values().next().map(String::as_str)
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.by_tick.clear();
        self.ticks.clear();
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_recent_is_first_touched() {
        let mut order = AccessOrder::new();

        order.touch("key1");
        order.touch("key2");
        order.touch("key3");

        assert_eq!(order.len(), 3);
        assert_eq!(order.least_recent(), Some("key1"));
    }

    #[test]
    fn test_touch_moves_key_to_most_recent() {
        let mut order = AccessOrder::new();

        order.touch("a");
        order.touch("b");
        order.touch("c");
        order.touch("a");

        assert_eq!(order.len(), 3);
        assert_eq!(order.least_recent(), Some("b"));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut order = AccessOrder::new();

        order.touch("a");
        order.touch("b");
        order.remove("a");
        order.remove("nonexistent");

        assert_eq!(order.least_recent(), Some("b"));

        order.clear();
        assert!(order.is_empty());
        assert_eq!(order.least_recent(), None);
    }
}

//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check stats accounting, capacity bounds and eviction order.

use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

use crate::cache::{EvictionPolicy, TtlStore};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,256}"
}

fn policy_strategy() -> impl Strategy<Value = EvictionPolicy> {
    prop_oneof![
        Just(EvictionPolicy::NearestExpiry),
        Just(EvictionPolicy::LeastRecentlyUsed),
        Just(EvictionPolicy::Reject),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    Flush,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        4 => valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        2 => valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
        1 => Just(CacheOp::Flush),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any operation sequence, hits and misses equal the observed get
    // outcomes since the last flush.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = TtlStore::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL, EvictionPolicy::NearestExpiry);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key, value, None);
                }
                CacheOp::Get { key } => match store.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Delete { key } => {
                    store.delete(&key);
                }
                CacheOp::Flush => {
                    store.flush();
                    expected_hits = 0;
                    expected_misses = 0;
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, store.len(), "Total entries mismatch");
    }

    // A get immediately after a set returns the stored value.
    #[test]
    fn prop_get_after_set(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = TtlStore::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL, EvictionPolicy::NearestExpiry);

        prop_assert!(store.set(key.clone(), value.clone(), None));
        prop_assert_eq!(store.get(&key), Some(value));
        prop_assert!(store.has(&key));
    }

    // Under every policy the store never holds more than its capacity, and
    // a refused set leaves the key absent.
    #[test]
    fn prop_capacity_enforcement(
        policy in policy_strategy(),
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..200)
    ) {
        let max_entries = 50;
        let mut store = TtlStore::new(max_entries, TEST_DEFAULT_TTL, policy);

        for (key, value) in entries {
            let existed = store.has(&key);
            let stored = store.set(key.clone(), value, None);
            prop_assert!(store.len() <= max_entries, "size {} exceeds max {}", store.len(), max_entries);
            prop_assert_eq!(stored, store.has(&key));
            if existed {
                prop_assert!(stored, "overwrite must always succeed");
            }
        }
    }

    // With the LRU policy, inserting past capacity evicts keys in insertion
    // order when none of them are read in between.
    #[test]
    fn prop_lru_eviction_order(keys in prop::collection::hash_set(valid_key_strategy(), 6..30)) {
        let keys: Vec<String> = keys.into_iter().collect();
        let capacity = 5;
        let mut store = TtlStore::new(capacity, TEST_DEFAULT_TTL, EvictionPolicy::LeastRecentlyUsed);

        for key in &keys {
            store.set(key.clone(), "v".to_string(), None);
        }

        let survivors: HashSet<&String> = keys.iter().rev().take(capacity).collect();
        for key in &keys {
            prop_assert_eq!(store.has(key), survivors.contains(key));
        }
        prop_assert_eq!(store.stats().evictions, (keys.len() - capacity) as u64);
    }

    // Flushing twice is indistinguishable from flushing once.
    #[test]
    fn prop_flush_idempotent(ops in prop::collection::vec(cache_op_strategy(), 0..30)) {
        let mut store = TtlStore::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL, EvictionPolicy::LeastRecentlyUsed);
        for op in ops {
            match op {
                CacheOp::Set { key, value } => { store.set(key, value, None); }
                CacheOp::Get { key } => { store.get(&key); }
                CacheOp::Delete { key } => { store.delete(&key); }
                CacheOp::Flush => store.flush(),
            }
        }

        store.flush();
        let once = store.stats();
        store.flush();
        prop_assert_eq!(store.stats(), once);
        prop_assert!(store.is_empty());
    }
}

// Separate proptest block with fewer cases for time-sensitive TTL tests
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    #[test]
    fn prop_ttl_expiration_behavior(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = TtlStore::new(TEST_MAX_ENTRIES, TEST_DEFAULT_TTL, EvictionPolicy::NearestExpiry);

        store.set(key.clone(), value.clone(), Some(Duration::from_millis(30)));
        prop_assert_eq!(store.get(&key), Some(value));

        std::thread::sleep(Duration::from_millis(50));

        prop_assert!(!store.has(&key));
        prop_assert_eq!(store.get(&key), None);
    }
}

//! Cache Module
//!
//! Provides in-memory response caching with TTL expiration and bounded capacity.

mod entry;
mod lru;
mod shared;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::AccessOrder;
pub use shared::ResponseCache;
pub use stats::CacheStats;
pub use store::{EvictionPolicy, TtlStore};

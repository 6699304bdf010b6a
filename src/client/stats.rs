//! Client Statistics Module
//!
//! Per-request counters and running latency for the executor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Client Stats ==
/// Aggregated outcome of every logical request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Running mean over all completed requests
    pub average_response_time_ms: f64,
    pub started_at: DateTime<Utc>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            average_response_time_ms: 0.0,
            started_at: Utc::now(),
            last_request_at: None,
        }
    }
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    /// Folds one completed request into the counters.
    ///
    /// The mean is updated as `(old * (n - 1) + this) / n`.
    pub fn record(&mut self, success: bool, elapsed: Duration) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let n = self.total_requests as f64;
        let this_ms = elapsed.as_secs_f64() * 1000.0;
        self.average_response_time_ms = (self.average_response_time_ms * (n - 1.0) + this_ms) / n;
        self.last_request_at = Some(Utc::now());
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    /// Zeroes the cache counters, keeping request counters.
    pub fn reset_cache_counters(&mut self) {
        self.cache_hits = 0;
        self.cache_misses = 0;
    }

    /// Percentage of requests that succeeded, 0.0 before any request.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

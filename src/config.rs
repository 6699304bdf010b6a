//! Configuration Module
//!
//! Handles loading and validating pipeline configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::error::{PipelineError, Result};
use crate::limiter::Priority;

/// Rate limiter parameters.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum number of jobs executing at once
    pub max_concurrent: usize,
    /// Upper bound of the reservoir level
    pub reservoir_ceiling: u64,
    /// Reservoir level at construction
    pub reservoir_initial: u64,
    /// Amount added to the reservoir on every refill tick
    pub refill_amount: u64,
    /// Time between refill ticks
    pub refill_interval: Duration,
    /// Queue length at which low-priority submissions are shed
    pub high_water_mark: usize,
    /// Submissions strictly below this priority are shed past the high-water mark
    pub shed_below: Priority,
    /// Queue length above which the limiter reports itself busy
    pub busy_queue_threshold: usize,
    /// Longest one executor attempt may wait for admission; None waits indefinitely
    pub admission_timeout: Option<Duration>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            reservoir_ceiling: 50,
            reservoir_initial: 50,
            refill_amount: 25,
            refill_interval: Duration::from_millis(2000),
            high_water_mark: 200,
            shed_below: Priority::Normal,
            busy_queue_threshold: 20,
            admission_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Response cache parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of keys held at once
    pub max_entries: usize,
    /// TTL applied when a set does not specify one
    pub default_ttl: Duration,
    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,
    /// What happens when a new key arrives at capacity
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            eviction: EvictionPolicy::NearestExpiry,
        }
    }
}

/// Retry parameters for the request executor.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single backoff delay
    pub max_delay: Duration,
    /// Deadline for one admitted transport call
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Bulk executor parameters.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Items processed concurrently per wave
    pub batch_size: usize,
    /// Pause between waves
    pub batch_delay: Duration,
    /// Largest accepted input
    pub max_items: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(100),
            max_items: 50,
        }
    }
}

/// Remote API location used by the HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base URL every endpoint is joined to
    pub base_url: String,
    /// Optional bearer token sent with every request
    pub api_token: Option<String>,
}

/// Pipeline configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub limiter: LimiterConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub bulk: BulkConfig,
    pub transport: TransportConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PM_MAX_CONCURRENT` - Concurrent transport calls (default: 10)
    /// - `PM_RESERVOIR_CEILING` - Reservoir ceiling (default: 50)
    /// - `PM_RESERVOIR_INITIAL` - Starting reservoir level (default: ceiling)
    /// - `PM_REFILL_AMOUNT` - Reservoir refill amount (default: 25)
    /// - `PM_REFILL_INTERVAL_MS` - Reservoir refill interval (default: 2000)
    /// - `PM_HIGH_WATER_MARK` - Queue length that triggers shedding (default: 200)
    /// - `PM_BUSY_QUEUE_THRESHOLD` - Queue length reported as busy (default: 20)
    /// - `PM_ADMISSION_TIMEOUT_MS` - Admission wait per attempt, 0 disables (default: 60000)
    /// - `PM_CACHE_MAX_ENTRIES` - Maximum cached keys (default: 1000)
    /// - `PM_CACHE_TTL_SECS` - Default cache TTL (default: 300)
    /// - `PM_CACHE_CLEANUP_SECS` - Expiry sweep interval (default: 60)
    /// - `PM_CACHE_EVICTION` - `nearest-expiry`, `lru` or `reject`
    /// - `PM_MAX_RETRIES` - Retries per request (default: 3)
    /// - `PM_BACKOFF_BASE_MS` / `PM_BACKOFF_MAX_MS` - Backoff bounds (default: 1000 / 10000)
    /// - `PM_REQUEST_TIMEOUT_SECS` - Transport call deadline (default: 30)
    /// - `PM_BULK_BATCH_SIZE` / `PM_BULK_BATCH_DELAY_MS` / `PM_BULK_MAX_ITEMS`
    ///   (default: 5 / 100 / 50)
    /// - `PM_API_BASE_URL` / `PM_API_TOKEN` - Remote API location and token
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reservoir_ceiling = env_or("PM_RESERVOIR_CEILING", defaults.limiter.reservoir_ceiling);

        Self {
            limiter: LimiterConfig {
                max_concurrent: env_or("PM_MAX_CONCURRENT", defaults.limiter.max_concurrent),
                reservoir_ceiling,
                reservoir_initial: env_or("PM_RESERVOIR_INITIAL", reservoir_ceiling),
                refill_amount: env_or("PM_REFILL_AMOUNT", defaults.limiter.refill_amount),
                refill_interval: Duration::from_millis(env_or(
                    "PM_REFILL_INTERVAL_MS",
                    defaults.limiter.refill_interval.as_millis() as u64,
                )),
                high_water_mark: env_or("PM_HIGH_WATER_MARK", defaults.limiter.high_water_mark),
                shed_below: defaults.limiter.shed_below,
                busy_queue_threshold: env_or(
                    "PM_BUSY_QUEUE_THRESHOLD",
                    defaults.limiter.busy_queue_threshold,
                ),
                admission_timeout: optional_millis(env_or(
                    "PM_ADMISSION_TIMEOUT_MS",
                    defaults
                        .limiter
                        .admission_timeout
                        .map_or(0, |timeout| timeout.as_millis() as u64),
                )),
            },
            cache: CacheConfig {
                max_entries: env_or("PM_CACHE_MAX_ENTRIES", defaults.cache.max_entries),
                default_ttl: Duration::from_secs(env_or(
                    "PM_CACHE_TTL_SECS",
                    defaults.cache.default_ttl.as_secs(),
                )),
                cleanup_interval: Duration::from_secs(env_or(
                    "PM_CACHE_CLEANUP_SECS",
                    defaults.cache.cleanup_interval.as_secs(),
                )),
                eviction: env_or("PM_CACHE_EVICTION", defaults.cache.eviction),
            },
            retry: RetryConfig {
                max_retries: env_or("PM_MAX_RETRIES", defaults.retry.max_retries),
                base_delay: Duration::from_millis(env_or(
                    "PM_BACKOFF_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )),
                max_delay: Duration::from_millis(env_or(
                    "PM_BACKOFF_MAX_MS",
                    defaults.retry.max_delay.as_millis() as u64,
                )),
                request_timeout: Duration::from_secs(env_or(
                    "PM_REQUEST_TIMEOUT_SECS",
                    defaults.retry.request_timeout.as_secs(),
                )),
            },
            bulk: BulkConfig {
                batch_size: env_or("PM_BULK_BATCH_SIZE", defaults.bulk.batch_size),
                batch_delay: Duration::from_millis(env_or(
                    "PM_BULK_BATCH_DELAY_MS",
                    defaults.bulk.batch_delay.as_millis() as u64,
                )),
                max_items: env_or("PM_BULK_MAX_ITEMS", defaults.bulk.max_items),
            },
            transport: TransportConfig {
                base_url: env::var("PM_API_BASE_URL").unwrap_or_default(),
                api_token: env::var("PM_API_TOKEN").ok().filter(|t| !t.is_empty()),
            },
        }
    }

    // == Validate ==
    /// Rejects values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.limiter.max_concurrent == 0 {
            return invalid("max_concurrent must be at least 1");
        }
        if self.limiter.reservoir_ceiling == 0 {
            return invalid("reservoir_ceiling must be at least 1");
        }
        if self.limiter.reservoir_initial > self.limiter.reservoir_ceiling {
            return invalid("reservoir_initial cannot exceed reservoir_ceiling");
        }
        if self.limiter.refill_interval.is_zero() {
            return invalid("refill_interval must be non-zero");
        }
        if self.limiter.refill_amount == 0 {
            return invalid("refill_amount must be at least 1");
        }
        if self.limiter.admission_timeout == Some(Duration::ZERO) {
            return invalid("admission_timeout must be non-zero when set");
        }
        if self.cache.cleanup_interval.is_zero() {
            return invalid("cleanup_interval must be non-zero");
        }
        if self.retry.request_timeout.is_zero() {
            return invalid("request_timeout must be non-zero");
        }
        if self.retry.base_delay > self.retry.max_delay {
            return invalid("backoff base delay cannot exceed max delay");
        }
        if self.bulk.batch_size == 0 {
            return invalid("bulk batch_size must be at least 1");
        }
        Ok(())
    }
}

/// Parses an environment variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Zero milliseconds means "not set".
fn optional_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

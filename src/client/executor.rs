//! Request Executor Module
//!
//! Runs one logical request end-to-end: cache lookup, rate-limited transport
//! call, retry with backoff, cache population and statistics.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::client::{BackoffPolicy, ClientStats, RequestDescriptor, Transport};
use crate::config::RetryConfig;
use crate::error::{PipelineError, Result, TransportError};
use crate::limiter::{JobOptions, RateLimiter};

// == Request Executor ==
/// Cache-aside executor over the rate limiter.
///
/// Cheap to clone; clones share the transport, limiter, cache and stats.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    cache: ResponseCache<Value>,
    stats: Arc<Mutex<ClientStats>>,
    backoff: BackoffPolicy,
    default_retries: u32,
    request_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        cache: ResponseCache<Value>,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            cache,
            stats: Arc::new(Mutex::new(ClientStats::new())),
            backoff: BackoffPolicy::from_config(retry),
            default_retries: retry.max_retries,
            request_timeout: retry.request_timeout,
        }
    }

    fn stats_guard(&self) -> MutexGuard<'_, ClientStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Execute ==
    /// Executes a descriptor and decodes the payload into `T`.
    ///
    /// A payload that does not match `T` is a failed request: it is reported
    /// as `Decode`, counted as a failure and never cached.
    pub async fn execute<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        self.run(descriptor, |value| {
            T::deserialize(value).map_err(|source| PipelineError::Decode {
                endpoint: descriptor.endpoint.clone(),
                source,
            })
        })
        .await
    }

    /// Executes a descriptor and returns the raw JSON payload.
    pub async fn execute_raw(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        self.run(descriptor, |value| Ok(value.clone())).await
    }

    /// Cache-aside execution shared by the typed and raw entry points.
    ///
    /// Statistics are updated exactly once per call, whatever the number of
    /// attempts. A cache hit counts as a successful request.
    async fn run<T, D>(&self, descriptor: &RequestDescriptor, decode: D) -> Result<T>
    where
        D: Fn(&Value) -> Result<T>,
    {
        let started = Instant::now();
        let cache_key = descriptor.is_cacheable().then(|| descriptor.cache_key());

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key).await {
                debug!(method = %descriptor.method, endpoint = %descriptor.endpoint, "Cache hit");
                let decoded = decode(&hit);
                let mut stats = self.stats_guard();
                stats.record_cache_hit();
                stats.record(decoded.is_ok(), started.elapsed());
                return decoded;
            }
            self.stats_guard().record_cache_miss();
        }

        let outcome = self
            .call_with_retries(descriptor)
            .await
            .and_then(|value| decode(&value).map(|decoded| (value, decoded)));

        let outcome = match outcome {
            Ok((value, decoded)) => {
                if let Some(key) = cache_key {
                    let stored = self.cache.set(key.clone(), value, descriptor.cache_ttl).await;
                    if !stored {
                        // Non-fatal: the response is still returned
                        warn!("{}", PipelineError::CacheCapacityExceeded { key });
                    }
                }
                Ok(decoded)
            }
            Err(err) => {
                warn!(
                    method = %descriptor.method,
                    endpoint = %descriptor.endpoint,
                    "Request failed: {}",
                    err
                );
                Err(err)
            }
        };

        self.stats_guard().record(outcome.is_ok(), started.elapsed());
        outcome
    }

    /// Attempts the call up to `max_retries + 1` times.
    ///
    /// Each attempt re-enters the limiter and may wait at most the configured
    /// admission timeout. Only transport failures are retried; limiter
    /// refusals and admission expiry end the loop immediately.
    async fn call_with_retries(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let max_retries = descriptor.max_retries.unwrap_or(self.default_retries);
        let mut options = JobOptions::with_priority(descriptor.priority);
        options.expiration = self.limiter.config().admission_timeout;
        let mut attempt: u32 = 0;

        loop {
            let result = self
                .limiter
                .schedule(options.clone(), || self.transport_call(descriptor))
                .await;

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            endpoint = %descriptor.endpoint,
                            "Request succeeded after {} attempts",
                            attempt + 1
                        );
                    }
                    return Ok(value);
                }
                Err(PipelineError::Transport(last)) => {
                    if attempt >= max_retries {
                        return Err(PipelineError::RetryExhausted {
                            method: descriptor.method,
                            endpoint: descriptor.endpoint.clone(),
                            attempts: attempt + 1,
                            last,
                        });
                    }

                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        endpoint = %descriptor.endpoint,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed: {}. Retrying",
                        last
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// One admitted transport call, bounded by the request timeout.
    async fn transport_call(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let call = self.transport.call(
            descriptor.method,
            &descriptor.endpoint,
            descriptor.body.as_ref(),
        );

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::from(TransportError::timeout(
                descriptor.method,
                descriptor.endpoint.clone(),
                self.request_timeout,
            ))),
        }
    }

    // == Logical Operations ==
    /// Fetches a resource through the cache.
    pub async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.execute(&RequestDescriptor::get(endpoint)).await
    }

    /// Runs a cached search with the query sent as parameters.
    pub async fn search<T: DeserializeOwned>(&self, endpoint: &str, query: Value) -> Result<T> {
        self.execute(&RequestDescriptor::search(endpoint, query)).await
    }

    pub async fn create<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T> {
        self.execute(&RequestDescriptor::post(endpoint, body)).await
    }

    /// Applies a partial update.
    pub async fn update<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T> {
        self.execute(&RequestDescriptor::patch(endpoint, body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.execute_raw(&RequestDescriptor::delete(endpoint)).await
    }

    // == Stats ==
    pub fn stats(&self) -> ClientStats {
        self.stats_guard().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats_guard() = ClientStats::new();
    }

    /// Empties the cache and zeroes every cache counter.
    pub async fn flush_cache(&self) {
        self.cache.flush().await;
        self.stats_guard().reset_cache_counters();
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

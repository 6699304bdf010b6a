//! Pipeline Module
//!
//! Wires the cache, rate limiter, request executor and bulk executor into one
//! explicitly constructed unit. Nothing here is global; every pipeline owns
//! its own components.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bulk::BulkExecutor;
use crate::cache::ResponseCache;
use crate::client::{ClientStats, RequestDescriptor, RequestExecutor, Transport};
use crate::config::Config;
use crate::error::Result;
use crate::limiter::{LimiterCounts, RateLimiter, TracingObserver};
use crate::tasks::spawn_cleanup_task;

/// A fully wired request pipeline.
///
/// Must be built inside a Tokio runtime: construction spawns the reservoir
/// refill and cache sweep tasks. Dropping the pipeline aborts the sweep.
pub struct Pipeline {
    config: Config,
    executor: RequestExecutor,
    bulk: BulkExecutor,
    sweep: JoinHandle<()>,
}

impl Pipeline {
    /// Validates `config` and builds every component around `transport`.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let limiter =
            RateLimiter::with_observer(config.limiter.clone(), Arc::new(TracingObserver));
        let cache: ResponseCache<Value> = ResponseCache::from_config(&config.cache);
        let sweep = spawn_cleanup_task(cache.clone(), config.cache.cleanup_interval);

        let executor = RequestExecutor::new(transport, limiter, cache, &config.retry);
        let bulk = BulkExecutor::new(executor.clone(), config.bulk.clone());

        info!(
            max_concurrent = config.limiter.max_concurrent,
            reservoir = config.limiter.reservoir_ceiling,
            cache_entries = config.cache.max_entries,
            "Pipeline initialized"
        );

        Ok(Self {
            config: config.clone(),
            executor,
            bulk,
            sweep,
        })
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn bulk(&self) -> &BulkExecutor {
        &self.bulk
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        self.executor.cache()
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.executor.limiter()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> ClientStats {
        self.executor.stats()
    }

    pub fn limiter_counts(&self) -> LimiterCounts {
        self.limiter().counts()
    }

    /// Runs `descriptor` on its own task.
    ///
    /// The request is not cancelled when the returned handle is dropped, so a
    /// later [`shutdown`](Self::shutdown) still waits for it once admitted.
    pub fn spawn(&self, descriptor: RequestDescriptor) -> JoinHandle<Result<Value>> {
        let executor = self.executor.clone();
        tokio::spawn(async move { executor.execute_raw(&descriptor).await })
    }

    // == Shutdown ==
    /// Drains the limiter, then stops the cache sweep.
    ///
    /// See [`RateLimiter::drain`] for the meaning of `drop_waiting`.
    pub async fn shutdown(&self, drop_waiting: bool) {
        info!(drop_waiting, "Draining pipeline");
        self.limiter().drain(drop_waiting).await;
        self.sweep.abort();
        info!("Pipeline shutdown complete");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.sweep.abort();
    }
}

//! Bulk Executor Module
//!
//! Runs many logical requests in fixed-size waves. Every item settles
//! independently; one failure never aborts its wave or the waves after it.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{Method, RequestDescriptor, RequestExecutor};
use crate::config::BulkConfig;
use crate::error::{PipelineError, Result};

// == Outcome Types ==
/// An item that failed, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure<I> {
    pub input: I,
    pub error: String,
}

/// Settled results of a bulk run, in input order within each list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkOutcome<I, T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BulkFailure<I>>,
}

impl<I, T> Default for BulkOutcome<I, T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<I, T> BulkOutcome<I, T> {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.success_count() + self.failure_count()
    }

    /// Percentage of items that succeeded, 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.success_count() as f64 / total as f64 * 100.0
        }
    }
}

// == Bulk Executor ==
#[derive(Clone)]
pub struct BulkExecutor {
    executor: RequestExecutor,
    config: BulkConfig,
}

impl BulkExecutor {
    pub fn new(executor: RequestExecutor, config: BulkConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    // == Run ==
    /// Executes one request per item, `batch_size` at a time.
    ///
    /// Waves run sequentially with `batch_delay` between them; items inside a
    /// wave run concurrently and are all awaited before the next wave starts.
    ///
    /// # Errors
    /// Returns `BatchSizeExceeded` before any request is issued when the
    /// input is larger than `max_items`. Item failures are reported in the
    /// outcome, never as an error.
    pub async fn run<I, T, B>(&self, items: Vec<I>, build: B) -> Result<BulkOutcome<I, T>>
    where
        T: DeserializeOwned,
        B: Fn(&I) -> RequestDescriptor,
    {
        let size = items.len();
        if size > self.config.max_items {
            return Err(PipelineError::BatchSizeExceeded {
                size,
                max: self.config.max_items,
            });
        }

        let batch_size = self.config.batch_size.max(1);
        let waves = size.div_ceil(batch_size);
        info!(items = size, waves, "Starting bulk run");

        let mut outcome = BulkOutcome::default();
        let mut remaining = items.into_iter();

        for wave in 0..waves {
            if wave > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let chunk: Vec<I> = remaining.by_ref().take(batch_size).collect();
            debug!(wave = wave + 1, size = chunk.len(), "Dispatching wave");

            let executor = &self.executor;
            let results = join_all(chunk.iter().map(|item| {
                let descriptor = build(item);
                async move { executor.execute::<T>(&descriptor).await }
            }))
            .await;

            for (input, result) in chunk.into_iter().zip(results) {
                match result {
                    Ok(value) => outcome.succeeded.push(value),
                    Err(err) => {
                        debug!(
                            endpoint = err.endpoint().unwrap_or("-"),
                            "Bulk item failed: {}",
                            err
                        );
                        outcome.failed.push(BulkFailure {
                            input,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        if outcome.failure_count() > 0 {
            warn!(
                succeeded = outcome.success_count(),
                failed = outcome.failure_count(),
                "Bulk run finished with failures"
            );
        } else {
            info!(succeeded = outcome.success_count(), "Bulk run finished");
        }
        Ok(outcome)
    }

    // == Bulk Operations ==
    /// Creates one resource per body in `collection`.
    pub async fn bulk_create(
        &self,
        collection: &str,
        bodies: Vec<Value>,
    ) -> Result<BulkOutcome<Value, Value>> {
        self.run(bodies, |body| {
            RequestDescriptor::post(collection, body.clone())
        })
        .await
    }

    /// Applies a partial update to each `(id, changes)` pair.
    pub async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(String, Value)>,
    ) -> Result<BulkOutcome<(String, Value), Value>> {
        self.run(updates, |(id, changes)| {
            RequestDescriptor::patch(member(collection, id), changes.clone())
        })
        .await
    }

    /// Sets `field` to `target` on every listed resource, e.g. moving issues
    /// to another state or assignee.
    pub async fn bulk_move(
        &self,
        collection: &str,
        ids: Vec<String>,
        field: &str,
        target: Value,
    ) -> Result<BulkOutcome<String, Value>> {
        self.run(ids, |id| {
            RequestDescriptor::patch(member(collection, id), json!({ field: target.clone() }))
        })
        .await
    }

    pub async fn bulk_archive(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<BulkOutcome<String, Value>> {
        self.run(ids, |id| {
            RequestDescriptor::new(Method::Post, format!("{}/archive", member(collection, id)))
        })
        .await
    }
}

fn member(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_end_matches('/'), id)
}

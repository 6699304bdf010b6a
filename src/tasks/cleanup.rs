//! Cache Sweep Task
//!
//! Background task that periodically removes expired cache entries so they
//! stop counting against capacity before anyone reads them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ResponseCache;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task runs until aborted; keep the returned handle and call `abort()`
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache: ResponseCache<Value> = ResponseCache::from_config(&config.cache);
/// let sweep = spawn_cleanup_task(cache.clone(), config.cache.cleanup_interval);
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task<V>(cache: ResponseCache<V>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting cache sweep task with interval of {:?}",
            interval
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;
            if removed > 0 {
                info!("Cache sweep: removed {} expired entries", removed);
            } else {
                debug!("Cache sweep: no expired entries found");
            }
        }
    })
}

//! PM Gateway - A rate-limited, cached request pipeline for a project-management API
//!
//! Provides a TTL response cache, a priority rate limiter with a replenishing
//! reservoir, a retrying cache-aside executor and a wave-based bulk executor.

pub mod bulk;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod tasks;

pub use bulk::{BulkExecutor, BulkFailure, BulkOutcome};
pub use cache::ResponseCache;
pub use client::{HttpTransport, Method, RequestDescriptor, RequestExecutor, Transport};
pub use config::Config;
pub use error::{PipelineError, Result, TransportError};
pub use limiter::{JobOptions, Priority, RateLimiter};
pub use pipeline::Pipeline;
pub use tasks::spawn_cleanup_task;

//! Rate Limiter Module
//!
//! Schedules outbound calls under a concurrency cap and a replenishing quota,
//! dispatching higher priorities first.

mod events;
mod job;
mod reservoir;
mod scheduler;


pub use events::{LimiterEvent, LimiterObserver, NoopObserver, TracingObserver};
pub use job::{JobOptions, JobState, Priority};
pub use reservoir::Reservoir;
pub use scheduler::{LimiterCounts, RateLimiter};

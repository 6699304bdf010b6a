//! Limiter Events Module
//!
//! Lifecycle notifications emitted by the scheduler, and the observers that
//! consume them.

use std::time::Duration;

use tracing::field::display;
use tracing::{debug, info, warn};

use crate::limiter::{JobState, Priority};

// == Limiter Event ==
/// State transition of a job, or of the reservoir.
#[derive(Debug, Clone, PartialEq)]
pub enum LimiterEvent {
    /// Job entered the queue
    Queued { id: String, priority: Priority, attempt: u32 },
    /// Job left the queue and started executing
    Admitted { id: String, attempt: u32, waited: Duration },
    /// Job finished successfully
    Done { id: String, attempt: u32 },
    /// Job's work failed
    Failed { id: String, attempt: u32, error: String, will_retry: bool },
    /// Job is about to wait before re-entering the queue
    Retrying { id: String, attempt: u32, delay: Duration },
    /// Job waited past its expiration without admission
    Expired { id: String, waited: Duration },
    /// Queued job was failed by a draining shutdown
    Dropped { id: String },
    /// Submission refused under load
    Shed { id: String, priority: Priority },
    /// An admission left the reservoir empty
    Depleted,
    /// Periodic refill ran
    Refilled { level: u64 },
}

impl LimiterEvent {
    /// State the affected job is in once this event has happened.
    ///
    /// A failure that will be retried leaves the job queued again. Reservoir
    /// events concern no job and return None.
    pub fn job_state(&self) -> Option<JobState> {
        match self {
            LimiterEvent::Queued { .. } | LimiterEvent::Retrying { .. } => Some(JobState::Queued),
            LimiterEvent::Admitted { .. } => Some(JobState::Executing),
            LimiterEvent::Done { .. } => Some(JobState::Done),
            LimiterEvent::Failed { will_retry: true, .. } => Some(JobState::Queued),
            LimiterEvent::Failed { .. }
            | LimiterEvent::Expired { .. }
            | LimiterEvent::Dropped { .. }
            | LimiterEvent::Shed { .. } => Some(JobState::Failed),
            LimiterEvent::Depleted | LimiterEvent::Refilled { .. } => None,
        }
    }
}

// == Observer ==
/// Receives every lifecycle event.
///
/// Called outside the scheduler's lock; implementations must be cheap and
/// must not block.
pub trait LimiterObserver: Send + Sync {
    fn on_event(&self, event: &LimiterEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LimiterObserver for NoopObserver {
    fn on_event(&self, _event: &LimiterEvent) {}
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LimiterObserver for TracingObserver {
    fn on_event(&self, event: &LimiterEvent) {
        let state = event.job_state().map(display);
        match event {
            LimiterEvent::Queued { id, priority, attempt } => {
                debug!(job = %id, state, %priority, attempt, "Job queued")
            }
            LimiterEvent::Admitted { id, attempt, waited } => {
                let waited_ms = waited.as_millis() as u64;
                debug!(job = %id, state, attempt, waited_ms, "Job executing")
            }
            LimiterEvent::Done { id, attempt } => debug!(job = %id, state, attempt, "Job done"),
            LimiterEvent::Failed { id, attempt, error, will_retry } => {
                warn!(job = %id, state, attempt, will_retry, "Job failed: {}", error)
            }
            LimiterEvent::Retrying { id, attempt, delay } => {
                let delay_ms = delay.as_millis() as u64;
                info!(job = %id, state, attempt, delay_ms, "Job will retry")
            }
            LimiterEvent::Expired { id, waited } => {
                let waited_ms = waited.as_millis() as u64;
                warn!(job = %id, state, waited_ms, "Job expired before admission")
            }
            LimiterEvent::Dropped { id } => {
                warn!(job = %id, state, "Queued job dropped by shutdown")
            }
            LimiterEvent::Shed { id, priority } => {
                warn!(job = %id, state, %priority, "Job shed, queue above high-water mark")
            }
            LimiterEvent::Depleted => warn!("Rate limit reservoir depleted"),
            LimiterEvent::Refilled { level } => debug!(level, "Reservoir refilled"),
        }
    }
}

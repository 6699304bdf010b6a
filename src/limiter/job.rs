//! Job Module
//!
//! Priority tiers and per-job submission options.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Priority ==
/// Dispatch tier; higher tiers are admitted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "medium" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

// == Job State ==
/// Lifecycle position of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Executing => "executing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// == Job Options ==
/// Submission parameters for one job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Caller-supplied id; generated when absent
    pub id: Option<String>,
    pub priority: Priority,
    /// Reservoir units consumed on admission
    pub weight: u64,
    /// Longest time one attempt may wait in the queue
    pub expiration: Option<Duration>,
    /// Additional attempts the limiter makes when the work fails
    pub retries: u32,
    /// Pause before a failed job re-enters the queue
    pub retry_delay: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            id: None,
            priority: Priority::Normal,
            weight: 1,
            expiration: None,
            retries: 0,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl JobOptions {
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a process-unique job id.
pub(crate) fn next_job_id() -> String {
    format!("job-{}", NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
}

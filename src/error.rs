//! Error types for the request pipeline
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::client::Method;
use crate::limiter::Priority;

// == Transport Error ==
/// Failure reported by the transport layer for a single attempt.
///
/// Carries enough context (method, endpoint, status, raw text) to diagnose
/// the failure without access to the original response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method} {endpoint} failed{}: {message}", status_suffix(.status))]
pub struct TransportError {
    /// HTTP method of the failed call
    pub method: Method,
    /// Endpoint path of the failed call
    pub endpoint: String,
    /// HTTP status, None for network-level failures and timeouts
    pub status: Option<u16>,
    /// Raw response text or underlying error message
    pub message: String,
    /// True when the call was admitted but did not finish in time
    pub timed_out: bool,
}

impl TransportError {
    /// Creates a transport error for a non-success status code.
    pub fn status(
        method: Method,
        endpoint: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            status: Some(status),
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a transport error for a network-level failure.
    pub fn network(
        method: Method,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            status: None,
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a transport error for a call that exceeded its deadline.
    pub fn timeout(method: Method, endpoint: impl Into<String>, after: Duration) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            status: None,
            message: format!("request timed out after {:?}", after),
            timed_out: true,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with status {}", status))
        .unwrap_or_default()
}

// == Pipeline Error Enum ==
/// Unified error type for the request pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Cache store is full and the eviction policy freed no space
    #[error("Cache capacity exceeded while storing {key}")]
    CacheCapacityExceeded { key: String },

    /// Job waited in the queue past its expiration without being admitted
    #[error("Job {job_id} expired after waiting {waited:?} for admission")]
    AdmissionExpired { job_id: String, waited: Duration },

    /// Single transport attempt failed
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// All attempts failed; wraps the last transport failure
    #[error("{method} {endpoint} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        method: Method,
        endpoint: String,
        attempts: u32,
        #[source]
        last: TransportError,
    },

    /// Bulk input exceeds the configured maximum
    #[error("Batch of {size} items exceeds maximum of {max}")]
    BatchSizeExceeded { size: usize, max: usize },

    /// Limiter is draining or stopped
    #[error("Rate limiter is stopped")]
    LimiterStopped,

    /// Submission rejected because the queue is above its high-water mark
    #[error("Job {job_id} at {priority} priority shed under load")]
    LoadShed { job_id: String, priority: Priority },

    /// Job weight can never be covered by the reservoir
    #[error("Job weight {weight} exceeds reservoir ceiling {ceiling}")]
    WeightExceedsCapacity { weight: u64, ceiling: u64 },

    /// Successful response could not be decoded into the requested type
    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Returns the endpoint involved, when the error is tied to one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            PipelineError::Transport(err) => Some(&err.endpoint),
            PipelineError::RetryExhausted { endpoint, .. } => Some(endpoint),
            PipelineError::Decode { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the request pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

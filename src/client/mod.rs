//! Client Module
//!
//! Request descriptors, the transport seam and the cache-aside executor.

mod descriptor;
mod executor;
mod retry;
mod stats;
mod transport;

pub use descriptor::{Method, RequestDescriptor};
pub use executor::RequestExecutor;
pub use retry::BackoffPolicy;
pub use stats::ClientStats;
pub use transport::{HttpTransport, Transport};

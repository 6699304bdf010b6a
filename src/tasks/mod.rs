//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the pipeline is up.
//!
//! # Tasks
//! - Cache sweep: Removes expired cache entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;

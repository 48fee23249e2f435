//! The processing queue.
//!
//! Split into focused submodules:
//! - `core`: queue handle, builder, submission, cancellation and accessors
//! - `dispatch`: start/stop and the scheduler loop that fills free slots
//! - `execution`: processor invocation, deadline race and settlement

mod core;
mod dispatch;
mod execution;

pub use self::core::{ProcessingQueue, QueueBuilder};

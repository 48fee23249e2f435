//! In-process file-processing task queue.
//!
//! Processors are registered per [`ProcessorType`](fileq_core::ProcessorType);
//! tasks are dispatched by priority under a concurrency cap, raced against a
//! deadline and retried with a constant delay. Lifecycle events are published
//! on a broadcast channel.

pub mod batch;
pub mod clock;
pub mod error;
pub mod events;
pub mod policy;
pub mod processor;
pub mod queue;
pub mod selector;
pub mod stats;
pub mod store;
pub mod task;

pub use batch::{BatchOptions, BatchResults, BatchTaskSpec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProcessorError, QueueError};
pub use events::{EventBus, QueueEvent};
pub use policy::{RetryDecision, RetryPolicy};
pub use processor::{FileProcessor, ProcessorRegistry};
pub use queue::{ProcessingQueue, QueueBuilder};
pub use stats::{HealthReport, QueueStats};
pub use store::CleanupReport;
pub use task::{QueueTask, TaskId, TaskOptions, TaskPriority, TaskStatus};

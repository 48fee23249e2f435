//! Queue error types.

use std::time::Duration;

use fileq_core::{CoreError, ProcessorType};
use thiserror::Error;

/// Errors surfaced by the processing queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No processor is registered for the requested type. Raised at submission;
    /// no task is created.
    #[error("no processor registered for type '{0}'")]
    UnregisteredProcessor(ProcessorType),

    #[error(transparent)]
    InvalidOptions(#[from] CoreError),

    #[error("invalid queue configuration: {0}")]
    Config(CoreError),

    #[error("task timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("processing failed: {0}")]
    Processing(String),
}

/// Errors returned by processor implementations.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Failed(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

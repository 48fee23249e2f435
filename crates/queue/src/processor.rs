//! Processor trait and the registry the queue resolves tasks against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fileq_core::{ProcessingOptions, ProcessingResult, ProcessorType};
use tracing::info;

use crate::error::ProcessorError;

/// A unit of transformation work registered for one [`ProcessorType`].
///
/// Implementations wrap a concrete codec or converter. They must be safe to
/// call concurrently with distinct input/output paths; the queue may run
/// several invocations at once and never cancels one in flight.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Which tasks this processor accepts.
    fn processor_type(&self) -> ProcessorType;

    /// Transform `input_path` into `output_path`.
    ///
    /// Returning `Err` or a result with `success == false` both count as a
    /// processing failure and go through the retry policy.
    async fn process(
        &self,
        input_path: &str,
        output_path: &str,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult, ProcessorError>;

    /// Advisory capability check used by upstream submission code.
    fn supports(&self, mime_type: &str) -> bool;
}

/// Lookup from processing type to its registered processor.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ProcessorType, Arc<dyn FileProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for the same type.
    pub fn register(&mut self, processor: Arc<dyn FileProcessor>) {
        let ty = processor.processor_type();
        if self.processors.insert(ty, processor).is_some() {
            info!(processor = %ty, "replaced file processor");
        } else {
            info!(processor = %ty, "registered file processor");
        }
    }

    pub fn get(&self, processor_type: ProcessorType) -> Option<Arc<dyn FileProcessor>> {
        self.processors.get(&processor_type).cloned()
    }

    pub fn contains(&self, processor_type: ProcessorType) -> bool {
        self.processors.contains_key(&processor_type)
    }

    /// First registered type (in [`ProcessorType::ALL`] order) whose processor
    /// claims support for `mime_type`.
    pub fn find_for_mime(&self, mime_type: &str) -> Option<ProcessorType> {
        ProcessorType::ALL.into_iter().find(|ty| {
            self.processors
                .get(ty)
                .is_some_and(|p| p.supports(mime_type))
        })
    }

    /// Registered types in [`ProcessorType::ALL`] order.
    pub fn types(&self) -> Vec<ProcessorType> {
        ProcessorType::ALL
            .into_iter()
            .filter(|ty| self.processors.contains_key(ty))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

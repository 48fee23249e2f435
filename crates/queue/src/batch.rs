//! Batch submission with aggregated progress and a single completion call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fileq_core::{ProcessingOptions, ProcessingResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QueueError;
use crate::queue::ProcessingQueue;
use crate::task::{run_isolated, QueueTask, TaskId, TaskOptions, TaskPriority};

/// One task in a batch. Deserializable so batches can come from manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTaskSpec {
    pub input_path: String,
    pub output_path: String,
    pub options: ProcessingOptions,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl BatchTaskSpec {
    pub fn new(
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            options,
            priority: TaskPriority::default(),
            max_retries: None,
            timeout_ms: None,
        }
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Per-task outcomes of a batch, keyed by task id in submission order.
/// Failed tasks appear as `ProcessingResult::failed(error)`.
pub type BatchResults = IndexMap<TaskId, ProcessingResult>;

type ProgressHook = Box<dyn Fn(usize, usize) + Send + Sync>;
type CompleteHook = Box<dyn FnOnce(BatchResults) + Send>;

/// Batch-level hooks.
#[derive(Default)]
pub struct BatchOptions {
    on_progress: Option<ProgressHook>,
    on_complete: Option<CompleteHook>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(settled, total)` after every task settles.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Called exactly once, after the last task settles.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(BatchResults) + Send + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }
}

struct BatchTracker {
    ids: Vec<TaskId>,
    total: usize,
    on_progress: Option<ProgressHook>,
    progress: Mutex<BatchProgress>,
}

#[derive(Default)]
struct BatchProgress {
    settled: IndexMap<TaskId, ProcessingResult>,
    on_complete: Option<CompleteHook>,
}

impl BatchTracker {
    fn record(&self, task: &QueueTask, result: ProcessingResult) {
        let finished = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            if progress.settled.insert(task.id, result).is_some() {
                debug!(task = %task.id, "duplicate batch settlement ignored");
                return;
            }
            let completed = progress.settled.len();
            // Reported under the lock so counts arrive in order.
            if let Some(on_progress) = &self.on_progress {
                run_isolated(&task.id, "on_batch_progress", || {
                    on_progress(completed, self.total)
                });
            }
            if completed < self.total {
                return;
            }
            progress
                .on_complete
                .take()
                .map(|hook| (hook, std::mem::take(&mut progress.settled)))
        };

        if let Some((on_complete, mut settled)) = finished {
            let results: BatchResults = self
                .ids
                .iter()
                .filter_map(|id| settled.swap_remove(id).map(|r| (*id, r)))
                .collect();
            info!(tasks = results.len(), "batch complete");
            run_isolated(&task.id, "on_batch_complete", || on_complete(results));
        }
    }
}

impl ProcessingQueue {
    /// Submit several tasks that share batch-level progress and completion
    /// hooks. Every entry is validated first; if any is rejected no task is
    /// created. A failing task never stops its siblings.
    pub fn add_batch_tasks(
        &self,
        specs: Vec<BatchTaskSpec>,
        options: BatchOptions,
    ) -> Result<Vec<TaskId>, QueueError> {
        let BatchOptions {
            on_progress,
            on_complete,
        } = options;

        if specs.is_empty() {
            if let Some(on_complete) = on_complete {
                on_complete(BatchResults::new());
            }
            return Ok(Vec::new());
        }

        // Task hooks resolve the tracker lazily; it is installed once every
        // entry has been accepted and all ids are known.
        let mut prepared = Vec::with_capacity(specs.len());
        let slot: Arc<Mutex<Option<Arc<BatchTracker>>>> = Arc::new(Mutex::new(None));
        for spec in specs {
            let on_done = Arc::clone(&slot);
            let on_fail = Arc::clone(&slot);
            let mut task_options = TaskOptions::new()
                .priority(spec.priority)
                .on_complete(move |task, result| {
                    if let Some(tracker) = tracker_of(&on_done) {
                        tracker.record(task, result.clone());
                    }
                })
                .on_error(move |task, error| {
                    if let Some(tracker) = tracker_of(&on_fail) {
                        tracker.record(task, ProcessingResult::failed(error));
                    }
                });
            task_options.max_retries = spec.max_retries;
            task_options.timeout = spec.timeout_ms.map(Duration::from_millis);

            prepared.push(self.inner.prepare(
                spec.input_path,
                spec.output_path,
                spec.options,
                task_options,
            )?);
        }

        let ids: Vec<TaskId> = prepared.iter().map(|e| e.task.id).collect();
        let tracker = Arc::new(BatchTracker {
            ids: ids.clone(),
            total: ids.len(),
            on_progress,
            progress: Mutex::new(BatchProgress {
                settled: IndexMap::with_capacity(ids.len()),
                on_complete,
            }),
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(tracker);

        info!(tasks = ids.len(), "batch submitted");
        for entry in prepared {
            self.inner.enqueue(entry);
        }
        Ok(ids)
    }
}

fn tracker_of(slot: &Mutex<Option<Arc<BatchTracker>>>) -> Option<Arc<BatchTracker>> {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use fileq_core::{CoreError, ProcessingOptions, ProcessorType, QueueConfig};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use crate::events::{EventBus, QueueEvent};
use crate::policy::RetryPolicy;
use crate::processor::{FileProcessor, ProcessorRegistry};
use crate::stats::{HealthReport, QueueStats};
use crate::store::{CleanupReport, TaskEntry, TaskStore};
use crate::task::{QueueTask, TaskId, TaskOptions, TaskStatus};

use super::dispatch::LoopHandle;

/// An in-process file-processing queue.
///
/// The handle is cheap to clone; clones share one task store, one registry
/// and one dispatch loop. Separate `ProcessingQueue::new` calls give fully
/// independent queues.
#[derive(Clone)]
pub struct ProcessingQueue {
    pub(crate) inner: Arc<QueueInner>,
}

pub(crate) struct QueueInner {
    pub(super) config: QueueConfig,
    pub(super) policy: RetryPolicy,
    pub(super) registry: RwLock<ProcessorRegistry>,
    pub(super) store: Mutex<TaskStore>,
    pub(super) events: EventBus,
    pub(super) clock: Arc<dyn Clock>,
    /// Dispatch trigger fired on submission, settlement and retry delay expiry.
    pub(super) wake: Arc<Notify>,
    pub(super) dispatcher: Mutex<Option<LoopHandle>>,
}

impl QueueInner {
    /// Lock the task store. Poisoning is recovered: the store is only
    /// mutated in short sections that never call user code.
    pub(super) fn store(&self) -> MutexGuard<'_, TaskStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn registry(&self) -> RwLockReadGuard<'_, ProcessorRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn dispatcher(&self) -> MutexGuard<'_, Option<LoopHandle>> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the processor and build a pending task without storing it.
    pub(crate) fn prepare(
        &self,
        input_path: String,
        output_path: String,
        options: ProcessingOptions,
        mut task_options: TaskOptions,
    ) -> Result<TaskEntry, QueueError> {
        let processor_type = options.processor_type();
        let processor = self
            .registry()
            .get(processor_type)
            .ok_or(QueueError::UnregisteredProcessor(processor_type))?;
        options.validate()?;
        if let Some(timeout) = task_options.timeout {
            if timeout < Duration::from_millis(1) {
                return Err(CoreError::InvalidOptions(format!(
                    "task timeout must be at least 1ms, got {timeout:?}"
                ))
                .into());
            }
        }

        let task = QueueTask {
            id: TaskId::new(),
            input_path,
            output_path,
            options,
            priority: task_options.priority,
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: self.policy.max_retries_for(task_options.max_retries),
            timeout_ms: task_options.timeout.map(|t| t.as_millis() as u64),
            created_at: self.clock.now(),
            start_time: None,
            end_time: None,
            result: None,
            error: None,
        };

        Ok(TaskEntry {
            task,
            processor,
            callbacks: task_options.take_callbacks(),
            generation: 0,
        })
    }

    /// Store a prepared task, announce it and wake the dispatcher.
    pub(crate) fn enqueue(&self, entry: TaskEntry) -> TaskId {
        let task = entry.task.clone();
        self.store().insert(entry);

        info!(
            task = %task.id,
            processor = %task.processor_type(),
            priority = %task.priority,
            "task added"
        );
        let id = task.id;
        self.events.publish(QueueEvent::TaskAdded { task });
        self.wake.notify_one();
        id
    }
}

/// Builder for [`ProcessingQueue`].
pub struct QueueBuilder {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    registry: ProcessorRegistry,
}

impl QueueBuilder {
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn processor(mut self, processor: Arc<dyn FileProcessor>) -> Self {
        self.registry.register(processor);
        self
    }

    /// Validate the configuration and create the queue. With `auto_start`
    /// the dispatch loop is started when a tokio runtime is available.
    pub fn build(self) -> Result<ProcessingQueue, QueueError> {
        self.config.validate().map_err(QueueError::Config)?;

        let inner = QueueInner {
            policy: RetryPolicy::new(self.config.max_retries, self.config.retry_delay()),
            registry: RwLock::new(self.registry),
            store: Mutex::new(TaskStore::new()),
            events: EventBus::new(self.config.event_capacity),
            clock: self.clock,
            wake: Arc::new(Notify::new()),
            dispatcher: Mutex::new(None),
            config: self.config,
        };
        let queue = ProcessingQueue {
            inner: Arc::new(inner),
        };

        if queue.inner.config.auto_start {
            queue.start();
        }
        Ok(queue)
    }
}

impl ProcessingQueue {
    pub fn builder() -> QueueBuilder {
        QueueBuilder {
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            registry: ProcessorRegistry::new(),
        }
    }

    /// A queue with the given configuration, the system clock and no processors.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    // ── Processors ──────────────────────────────────────────────────

    /// Register a processor. Tasks already submitted keep the processor
    /// they resolved at submission.
    pub fn register_processor(&self, processor: Arc<dyn FileProcessor>) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(processor);
    }

    pub fn registered_types(&self) -> Vec<ProcessorType> {
        self.inner.registry().types()
    }

    /// First registered processor type advertising support for `mime_type`.
    pub fn processor_for_mime(&self, mime_type: &str) -> Option<ProcessorType> {
        self.inner.registry().find_for_mime(mime_type)
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Submit a task. Returns immediately with its id.
    ///
    /// Fails without creating a task when no processor is registered for
    /// the options' type or the options are out of range.
    pub fn add_task(
        &self,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        options: ProcessingOptions,
        task_options: TaskOptions,
    ) -> Result<TaskId, QueueError> {
        let entry = self.inner.prepare(
            input_path.into(),
            output_path.into(),
            options,
            task_options,
        )?;
        Ok(self.inner.enqueue(entry))
    }

    /// Cancel a pending task. Running, finished and unknown tasks are left
    /// untouched and `false` is returned.
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        let cancelled = {
            let mut store = self.inner.store();
            match store.get_mut(id) {
                Some(entry) if entry.task.status == TaskStatus::Pending => {
                    entry.task.status = TaskStatus::Cancelled;
                    Some(entry.task.clone())
                }
                _ => None,
            }
        };

        match cancelled {
            Some(task) => {
                info!(task = %task.id, "task cancelled");
                self.inner.events.publish(QueueEvent::TaskCancelled { task });
                true
            }
            None => {
                debug!(task = %id, "cancel ignored: task is not pending");
                false
            }
        }
    }

    /// Same contract as [`cancel_task`](Self::cancel_task): there is no
    /// resumable paused state.
    pub fn pause_task(&self, id: &TaskId) -> bool {
        self.cancel_task(id)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn get_task(&self, id: &TaskId) -> Option<QueueTask> {
        self.inner.store().snapshot(id)
    }

    /// Every stored task, in submission order.
    pub fn get_all_tasks(&self) -> Vec<QueueTask> {
        self.inner.store().snapshots()
    }

    pub fn get_pending_tasks(&self) -> Vec<QueueTask> {
        self.inner.store().with_status(TaskStatus::Pending)
    }

    pub fn get_running_tasks(&self) -> Vec<QueueTask> {
        self.inner.store().with_status(TaskStatus::Running)
    }

    pub fn len(&self) -> usize {
        self.inner.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_tasks(self.inner.store().tasks())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::evaluate(&self.stats(), &self.inner.config.health)
    }

    /// Remove completed, failed and cancelled tasks.
    pub fn cleanup(&self) -> CleanupReport {
        let report = self.inner.store().cleanup();
        info!(
            cleaned = report.cleaned,
            remaining = report.remaining,
            "queue cleanup"
        );
        self.inner.events.publish(QueueEvent::Cleanup(report));
        report
    }

    /// Subscribe to lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }
}

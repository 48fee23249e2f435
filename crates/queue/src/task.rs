//! Task records, priorities, statuses and per-task callbacks.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fileq_core::{ProcessingOptions, ProcessingResult, ProcessorType};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// Unique task identifier, generated at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task_{}", self.0.simple())
    }
}

/// Dispatch precedence. Lower numeric value = higher priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Urgent = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        };
        f.write_str(s)
    }
}

/// Lifecycle status.
///
/// Edges: `Pending -> Running -> {Completed | Pending (retry) | Failed}` and
/// `Pending -> Cancelled`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Point-in-time view of a task, handed out by accessors and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: TaskId,
    pub input_path: String,
    pub output_path: String,
    pub options: ProcessingOptions,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub retries: u32,
    pub max_retries: u32,
    /// Per-task deadline override in milliseconds.
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<ProcessingResult>,
    pub error: Option<String>,
}

impl QueueTask {
    pub fn processor_type(&self) -> ProcessorType {
        self.options.processor_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `end_time - start_time`, when both are recorded.
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

// ── Callbacks ───────────────────────────────────────────────────────

/// Progress hook: receives the task and a percentage (0.0 at start, 100.0 at completion).
pub type ProgressCallback = Arc<dyn Fn(&QueueTask, f64) + Send + Sync>;
/// Completion hook.
pub type CompleteCallback = Arc<dyn Fn(&QueueTask, &ProcessingResult) + Send + Sync>;
/// Terminal failure hook.
pub type ErrorCallback = Arc<dyn Fn(&QueueTask, &str) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct TaskCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompleteCallback>,
    pub on_error: Option<ErrorCallback>,
}

/// Per-task submission options. Unset fields fall back to queue defaults.
#[derive(Clone, Default)]
pub struct TaskOptions {
    pub priority: TaskPriority,
    /// `Some(0)` disables retries for this task.
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompleteCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueueTask, f64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueueTask, &ProcessingResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueueTask, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn take_callbacks(&mut self) -> TaskCallbacks {
        TaskCallbacks {
            on_progress: self.on_progress.take(),
            on_complete: self.on_complete.take(),
            on_error: self.on_error.take(),
        }
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Run a user hook so that a panic inside it is logged and swallowed.
pub(crate) fn run_isolated(task: &TaskId, hook: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        error!(task = %task, hook, "task callback panicked: {}", panic_message(payload.as_ref()));
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

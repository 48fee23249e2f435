//! Lifecycle notifications published by the queue.
//!
//! Topics follow the pattern `fileq.<scope>.<event>`.

use fileq_core::ProcessingResult;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::store::CleanupReport;
use crate::task::QueueTask;

// ── Task topics ───────────────────────────────────────────────────────

pub const TASK_ADDED: &str = "fileq.task.added";
pub const TASK_STARTED: &str = "fileq.task.started";
pub const TASK_COMPLETED: &str = "fileq.task.completed";
pub const TASK_FAILED: &str = "fileq.task.failed";
pub const TASK_RETRIED: &str = "fileq.task.retried";
pub const TASK_CANCELLED: &str = "fileq.task.cancelled";

// ── Queue topics ──────────────────────────────────────────────────────

pub const QUEUE_STARTED: &str = "fileq.queue.started";
pub const QUEUE_STOPPED: &str = "fileq.queue.stopped";
pub const QUEUE_CLEANUP: &str = "fileq.queue.cleanup";

/// A lifecycle event. Task variants carry a snapshot taken at the moment of
/// the transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    TaskAdded { task: QueueTask },
    TaskStarted { task: QueueTask },
    TaskCompleted { task: QueueTask, result: ProcessingResult },
    TaskFailed { task: QueueTask, error: String },
    TaskRetried { task: QueueTask },
    TaskCancelled { task: QueueTask },
    Started,
    Stopped,
    Cleanup(CleanupReport),
}

impl QueueEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            QueueEvent::TaskAdded { .. } => TASK_ADDED,
            QueueEvent::TaskStarted { .. } => TASK_STARTED,
            QueueEvent::TaskCompleted { .. } => TASK_COMPLETED,
            QueueEvent::TaskFailed { .. } => TASK_FAILED,
            QueueEvent::TaskRetried { .. } => TASK_RETRIED,
            QueueEvent::TaskCancelled { .. } => TASK_CANCELLED,
            QueueEvent::Started => QUEUE_STARTED,
            QueueEvent::Stopped => QUEUE_STOPPED,
            QueueEvent::Cleanup(_) => QUEUE_CLEANUP,
        }
    }

    /// The task snapshot, for task-scoped events.
    pub fn task(&self) -> Option<&QueueTask> {
        match self {
            QueueEvent::TaskAdded { task }
            | QueueEvent::TaskStarted { task }
            | QueueEvent::TaskCompleted { task, .. }
            | QueueEvent::TaskFailed { task, .. }
            | QueueEvent::TaskRetried { task }
            | QueueEvent::TaskCancelled { task } => Some(task),
            QueueEvent::Started | QueueEvent::Stopped | QueueEvent::Cleanup(_) => None,
        }
    }
}

/// Fan-out channel for [`QueueEvent`]s.
///
/// Publishing never blocks and never fails the caller: with no subscribers
/// the event is dropped, and slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: QueueEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

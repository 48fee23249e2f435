//! In-memory task table keyed by [`TaskId`], kept in submission order.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::processor::FileProcessor;
use crate::selector::select_next;
use crate::task::{QueueTask, TaskCallbacks, TaskId, TaskStatus};

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub remaining: usize,
}

/// A stored task plus the runtime pieces that never leave the queue.
pub(crate) struct TaskEntry {
    pub task: QueueTask,
    pub processor: Arc<dyn FileProcessor>,
    pub callbacks: TaskCallbacks,
    /// Bumped on every dispatch. A settlement whose generation no longer
    /// matches belongs to a superseded attempt and is dropped.
    pub generation: u64,
}

#[derive(Default)]
pub(crate) struct TaskStore {
    tasks: IndexMap<TaskId, TaskEntry>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: TaskEntry) {
        self.tasks.insert(entry.task.id, entry);
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskEntry> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskEntry> {
        self.tasks.get_mut(id)
    }

    pub fn snapshot(&self, id: &TaskId) -> Option<QueueTask> {
        self.tasks.get(id).map(|e| e.task.clone())
    }

    /// All tasks, in submission order.
    pub fn tasks(&self) -> impl Iterator<Item = &QueueTask> {
        self.tasks.values().map(|e| &e.task)
    }

    pub fn snapshots(&self) -> Vec<QueueTask> {
        self.tasks().cloned().collect()
    }

    pub fn with_status(&self, status: TaskStatus) -> Vec<QueueTask> {
        self.tasks()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks().filter(|t| t.status == status).count()
    }

    pub fn next_pending(&self) -> Option<TaskId> {
        select_next(self.tasks())
    }

    /// Drop every terminal task.
    pub fn cleanup(&mut self) -> CleanupReport {
        let before = self.tasks.len();
        self.tasks.retain(|_, e| !e.task.is_terminal());
        CleanupReport {
            cleaned: before - self.tasks.len(),
            remaining: self.tasks.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

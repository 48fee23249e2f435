use crate::task::{QueueTask, TaskId, TaskStatus};

/// Pick the next task to dispatch.
///
/// Only pending tasks are candidates. The highest priority wins; among equal
/// priorities the earliest-submitted task wins, given `tasks` iterates in
/// submission order.
pub fn select_next<'a, I>(tasks: I) -> Option<TaskId>
where
    I: IntoIterator<Item = &'a QueueTask>,
{
    tasks
        .into_iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .min_by_key(|t| t.priority)
        .map(|t| t.id)
}

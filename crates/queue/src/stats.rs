//! Queue statistics and heuristic health checks.

use fileq_core::HealthThresholds;
use serde::Serialize;

use crate::task::{QueueTask, TaskStatus};

/// Aggregate counts and timings over a task snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean `end_time - start_time` over completed tasks, in milliseconds.
    pub average_processing_ms: f64,
    /// `completed / total`, 0.0 for an empty queue.
    pub success_rate: f64,
}

impl QueueStats {
    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a QueueTask>,
    {
        let mut stats = QueueStats::default();
        let mut timed = 0usize;
        let mut total_ms = 0i64;

        for task in tasks {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => {
                    stats.completed += 1;
                    if let Some(elapsed) = task.processing_time() {
                        total_ms += elapsed.num_milliseconds();
                        timed += 1;
                    }
                }
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }

        if timed > 0 {
            stats.average_processing_ms = total_ms as f64 / timed as f64;
        }
        if stats.total > 0 {
            stats.success_rate = stats.completed as f64 / stats.total as f64;
        }
        stats
    }
}

/// Health verdict with paired issue/recommendation messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    pub fn evaluate(stats: &QueueStats, thresholds: &HealthThresholds) -> Self {
        let mut report = HealthReport {
            is_healthy: true,
            ..Default::default()
        };

        if stats.success_rate < thresholds.min_success_rate
            && stats.total > thresholds.success_rate_min_tasks
        {
            report.flag(
                format!("Low success rate: {:.1}%", stats.success_rate * 100.0),
                "Check processor configuration and input file quality",
            );
        }

        if stats.pending > thresholds.max_pending_tasks {
            report.flag(
                format!("Pending task backlog: {} tasks", stats.pending),
                "Consider raising the concurrency cap or optimizing processor throughput",
            );
        }

        if stats.average_processing_ms > thresholds.max_average_processing_ms {
            report.flag(
                format!(
                    "Average processing time too long: {:.1}s",
                    stats.average_processing_ms / 1000.0
                ),
                "Optimize processing logic or reduce processing complexity",
            );
        }

        report
    }

    fn flag(&mut self, issue: String, recommendation: &str) {
        self.is_healthy = false;
        self.issues.push(issue);
        self.recommendations.push(recommendation.to_string());
    }
}

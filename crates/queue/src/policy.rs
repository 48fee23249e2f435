//! Retry policy applied to failed attempts.

use std::time::Duration;

/// What to do with a task whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue as pending. `attempt` is the new retry count.
    Retry { attempt: u32, delay: Duration },
    /// Retry budget exhausted; the task fails terminally.
    GiveUp,
}

/// Constant-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub default_max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(default_max_retries: u32, delay: Duration) -> Self {
        Self {
            default_max_retries,
            delay,
        }
    }

    /// Effective retry budget for a task. An explicit per-task value wins,
    /// including zero.
    pub fn max_retries_for(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_max_retries)
    }

    pub fn decide(&self, retries: u32, max_retries: u32) -> RetryDecision {
        if retries < max_retries {
            RetryDecision::Retry {
                attempt: retries + 1,
                delay: self.delay,
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

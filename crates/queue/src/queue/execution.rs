use std::sync::Arc;
use std::time::Duration;

use fileq_core::ProcessingResult;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::{ProcessorError, QueueError};
use crate::events::QueueEvent;
use crate::policy::RetryDecision;
use crate::processor::FileProcessor;
use crate::task::{panic_message, run_isolated, QueueTask, TaskCallbacks, TaskId, TaskStatus};

use super::core::QueueInner;

/// Everything the runner needs for one attempt, captured at dispatch.
pub(crate) struct Dispatch {
    pub task: QueueTask,
    pub processor: Arc<dyn FileProcessor>,
    pub callbacks: TaskCallbacks,
    pub generation: u64,
    pub timeout: Duration,
}

/// How an attempt ended, as seen by the scheduler.
pub(crate) enum Outcome {
    Success(ProcessingResult),
    Failure(QueueError),
}

impl Outcome {
    fn from_join(joined: Result<Result<ProcessingResult, ProcessorError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(result)) if result.success => Outcome::Success(result),
            Ok(Ok(result)) => Outcome::Failure(QueueError::Processing(
                result
                    .error
                    .unwrap_or_else(|| "processor reported failure".to_string()),
            )),
            Ok(Err(e)) => Outcome::Failure(QueueError::Processing(e.to_string())),
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                Outcome::Failure(QueueError::Processing(format!(
                    "processor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
            Err(e) => Outcome::Failure(QueueError::Processing(e.to_string())),
        }
    }
}

/// State change made by a settlement, applied under the store lock and
/// announced after it is released.
enum Settled {
    Completed {
        task: QueueTask,
        result: ProcessingResult,
        callbacks: TaskCallbacks,
    },
    Retried {
        task: QueueTask,
        error: String,
        delay: Duration,
    },
    Failed {
        task: QueueTask,
        error: String,
        callbacks: TaskCallbacks,
    },
}

impl QueueInner {
    /// Run one attempt: the processor races the deadline. The processor
    /// call is never cancelled; if the deadline wins, its eventual result is
    /// still fed to `settle`, which discards it.
    pub(super) async fn execute(self: Arc<Self>, run: Dispatch) {
        let id = run.task.id;
        // Off the scheduler loop: a slow hook delays only its own task.
        if let Some(on_progress) = &run.callbacks.on_progress {
            run_isolated(&id, "on_progress", || on_progress(&run.task, 0.0));
        }

        let processor = Arc::clone(&run.processor);
        let input = run.task.input_path.clone();
        let output = run.task.output_path.clone();
        let options = run.task.options.clone();

        let mut work =
            tokio::spawn(async move { processor.process(&input, &output, &options).await });

        tokio::select! {
            joined = &mut work => {
                self.settle(id, run.generation, Outcome::from_join(joined));
            }
            _ = tokio::time::sleep(run.timeout) => {
                warn!(
                    task = %id,
                    timeout_ms = run.timeout.as_millis() as u64,
                    "task deadline elapsed"
                );
                self.settle(id, run.generation, Outcome::Failure(QueueError::Timeout(run.timeout)));

                let late = work.await;
                self.settle(id, run.generation, Outcome::from_join(late));
            }
        }
    }

    /// Apply an attempt's outcome. Results for tasks that are no longer
    /// running under the same generation are dropped.
    pub(super) fn settle(&self, id: TaskId, generation: u64, outcome: Outcome) {
        let now = self.clock.now();

        let settled = {
            let mut store = self.store();
            let Some(entry) = store.get_mut(&id) else {
                debug!(task = %id, "result for removed task discarded");
                return;
            };
            if entry.task.status != TaskStatus::Running || entry.generation != generation {
                debug!(task = %id, status = ?entry.task.status, "late result discarded");
                return;
            }

            let task = &mut entry.task;
            match outcome {
                Outcome::Success(result) => {
                    task.status = TaskStatus::Completed;
                    task.end_time = Some(now);
                    task.result = Some(result.clone());
                    task.error = None;
                    Settled::Completed {
                        task: task.clone(),
                        result,
                        callbacks: entry.callbacks.clone(),
                    }
                }
                Outcome::Failure(err) => {
                    let error = err.to_string();
                    match self.policy.decide(task.retries, task.max_retries) {
                        RetryDecision::Retry { attempt, delay } => {
                            task.retries = attempt;
                            task.status = TaskStatus::Pending;
                            task.error = None;
                            task.start_time = None;
                            task.end_time = None;
                            Settled::Retried {
                                task: task.clone(),
                                error,
                                delay,
                            }
                        }
                        RetryDecision::GiveUp => {
                            task.status = TaskStatus::Failed;
                            task.end_time = Some(now);
                            task.error = Some(error.clone());
                            task.result = None;
                            Settled::Failed {
                                task: task.clone(),
                                error,
                                callbacks: entry.callbacks.clone(),
                            }
                        }
                    }
                }
            }
        };

        match settled {
            Settled::Completed {
                task,
                result,
                callbacks,
            } => {
                info!(task = %task.id, retries = task.retries, "task completed");
                if let Some(on_progress) = &callbacks.on_progress {
                    run_isolated(&task.id, "on_progress", || on_progress(&task, 100.0));
                }
                if let Some(on_complete) = &callbacks.on_complete {
                    run_isolated(&task.id, "on_complete", || on_complete(&task, &result));
                }
                self.events.publish(QueueEvent::TaskCompleted { task, result });
            }
            Settled::Retried { task, error, delay } => {
                info!(
                    task = %task.id,
                    attempt = task.retries,
                    max_retries = task.max_retries,
                    %error,
                    "task retry scheduled"
                );
                self.events.publish(QueueEvent::TaskRetried { task });

                let wake = Arc::clone(&self.wake);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    wake.notify_one();
                });
            }
            Settled::Failed {
                task,
                error,
                callbacks,
            } => {
                warn!(task = %task.id, retries = task.retries, %error, "task failed");
                if let Some(on_error) = &callbacks.on_error {
                    run_isolated(&task.id, "on_error", || on_error(&task, &error));
                }
                self.events.publish(QueueEvent::TaskFailed { task, error });
            }
        }

        // Reuse the freed slot without waiting for the next tick.
        self.wake.notify_one();
    }
}

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::QueueEvent;
use crate::store::TaskStore;
use crate::task::{TaskId, TaskStatus};

use super::core::{ProcessingQueue, QueueInner};
use super::execution::Dispatch;

/// A running dispatch loop.
pub(crate) struct LoopHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ProcessingQueue {
    /// Start the dispatch loop. No-op if already running; warns and stays
    /// stopped when called outside a tokio runtime.
    pub fn start(&self) {
        let mut dispatcher = self.inner.dispatcher();
        if dispatcher.is_some() {
            debug!("queue already running");
            return;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("no tokio runtime available, queue stays stopped");
                return;
            }
        };

        let shutdown = Arc::new(Notify::new());
        let handle = runtime.spawn(run_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&shutdown),
            self.inner.config.tick_interval(),
        ));
        *dispatcher = Some(LoopHandle { shutdown, handle });
        drop(dispatcher);

        info!(
            max_concurrent = self.inner.config.max_concurrent_tasks,
            "queue started"
        );
        self.inner.events.publish(QueueEvent::Started);
    }

    /// Stop dispatching. Queued tasks stay pending and running tasks settle
    /// normally; `start` resumes from the same state.
    pub fn stop(&self) {
        let Some(running) = self.inner.dispatcher().take() else {
            debug!("queue already stopped");
            return;
        };
        running.shutdown.notify_one();
        // Detached; the loop exits on the shutdown signal.
        drop(running.handle);

        info!("queue stopped");
        self.inner.events.publish(QueueEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.inner.dispatcher().is_some()
    }
}

/// Scheduler loop: dispatch on every tick and on every wake-up until
/// shutdown or until the queue itself is dropped.
async fn run_loop(inner: Weak<QueueInner>, shutdown: Arc<Notify>, tick: Duration) {
    let Some(wake) = inner.upgrade().map(|q| Arc::clone(&q.wake)) else {
        return;
    };
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = wake.notified() => {}
            _ = ticker.tick() => {}
        }

        let Some(queue) = inner.upgrade() else { break };
        queue.dispatch();
    }
    debug!("dispatch loop exited");
}

impl QueueInner {
    /// Fill every free concurrency slot from the pending set, best
    /// candidate first.
    pub(super) fn dispatch(self: &Arc<Self>) {
        let started = {
            let mut store = self.store();
            let mut running = store.count_status(TaskStatus::Running);
            let mut started = Vec::new();

            while running < self.config.max_concurrent_tasks {
                let Some(id) = store.next_pending() else { break };
                let Some(run) = self.begin_run(&mut store, &id) else { break };
                started.push(run);
                running += 1;
            }
            started
        };

        for run in started {
            info!(
                task = %run.task.id,
                priority = %run.task.priority,
                attempt = run.task.retries + 1,
                "task started"
            );
            self.events.publish(QueueEvent::TaskStarted {
                task: run.task.clone(),
            });
            tokio::spawn(Arc::clone(self).execute(run));
        }
    }

    /// Move a pending task to running and capture what the runner needs.
    fn begin_run(&self, store: &mut TaskStore, id: &TaskId) -> Option<Dispatch> {
        let entry = store.get_mut(id)?;
        entry.generation += 1;
        entry.task.status = TaskStatus::Running;
        entry.task.start_time = Some(self.clock.now());
        entry.task.end_time = None;

        let timeout = entry
            .task
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.task_timeout());

        Some(Dispatch {
            task: entry.task.clone(),
            processor: Arc::clone(&entry.processor),
            callbacks: entry.callbacks.clone(),
            generation: entry.generation,
            timeout,
        })
    }
}

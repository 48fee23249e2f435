//! Dispatch order, concurrency cap, cancellation, start/stop and callback
//! isolation.

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fileq_core::QueueConfig;
use fileq_queue::{ProcessingQueue, QueueEvent, TaskId, TaskOptions, TaskPriority, TaskStatus};

use common::{document_options, is_terminal, next_event, test_config, wait_for, ScriptedProcessor};

fn queue_with(processor: Arc<ScriptedProcessor>, config: QueueConfig) -> ProcessingQueue {
    ProcessingQueue::builder()
        .config(config)
        .processor(processor)
        .build()
        .unwrap()
}

fn submit(queue: &ProcessingQueue, name: &str, options: TaskOptions) -> TaskId {
    queue
        .add_task(
            format!("in/{name}.txt"),
            format!("out/{name}.txt"),
            document_options(),
            options,
        )
        .unwrap()
}

// ── Dispatch order ──────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatch_follows_priority_then_submission_order() {
    let processor = Arc::new(ScriptedProcessor::succeeding().delay(Duration::from_millis(30)));
    let queue = queue_with(Arc::clone(&processor), test_config(2));
    let mut rx = queue.subscribe();

    let priorities = [
        TaskPriority::Low,
        TaskPriority::Low,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Urgent,
    ];
    let ids: Vec<TaskId> = priorities
        .iter()
        .enumerate()
        .map(|(i, p)| submit(&queue, &format!("t{i}"), TaskOptions::new().priority(*p)))
        .collect();

    queue.start();

    let mut started = Vec::new();
    let mut running = 0usize;
    let mut peak = 0usize;
    let mut settled = 0;
    while settled < ids.len() {
        match next_event(&mut rx).await {
            QueueEvent::TaskStarted { task } => {
                started.push(task.id);
                running += 1;
                peak = peak.max(running);
            }
            QueueEvent::TaskCompleted { .. } => {
                running -= 1;
                settled += 1;
            }
            QueueEvent::TaskFailed { task, error } => {
                panic!("task {} failed unexpectedly: {error}", task.id)
            }
            _ => {}
        }
    }

    assert_eq!(started, vec![ids[4], ids[2], ids[3], ids[0], ids[1]]);
    assert!(peak <= 2, "observed {peak} concurrently running tasks");
    assert!(processor.max_in_flight() <= 2);
    assert_eq!(processor.calls(), 5);
}

#[tokio::test]
async fn test_running_count_never_exceeds_cap() {
    let processor = Arc::new(ScriptedProcessor::succeeding().delay(Duration::from_millis(20)));
    let queue = queue_with(Arc::clone(&processor), test_config(3));
    let mut rx = queue.subscribe();

    for i in 0..12 {
        submit(&queue, &format!("bulk{i}"), TaskOptions::new());
    }
    queue.start();

    let mut settled = 0;
    while settled < 12 {
        let event = next_event(&mut rx).await;
        if matches!(event, QueueEvent::TaskStarted { .. }) {
            assert!(queue.get_running_tasks().len() <= 3);
        }
        if is_terminal(&event) {
            settled += 1;
        }
    }

    assert!(processor.max_in_flight() <= 3);
    assert_eq!(queue.stats().completed, 12);
}

// ── Retry position ──────────────────────────────────────────────────

/// Ids in `TaskStarted` order until `settled` tasks reach a terminal state.
async fn start_order(
    rx: &mut tokio::sync::broadcast::Receiver<QueueEvent>,
    settled: usize,
) -> Vec<TaskId> {
    let mut started = Vec::new();
    let mut done = 0;
    while done < settled {
        let event = next_event(rx).await;
        if let QueueEvent::TaskStarted { task } = &event {
            started.push(task.id);
        }
        if is_terminal(&event) {
            done += 1;
        }
    }
    started
}

#[tokio::test]
async fn test_retried_task_keeps_submission_position() {
    let queue = queue_with(Arc::new(ScriptedProcessor::failing_first(1)), test_config(1));
    let mut rx = queue.subscribe();

    let ids: Vec<TaskId> = (0..3)
        .map(|i| submit(&queue, &format!("t{i}"), TaskOptions::new()))
        .collect();
    queue.start();

    assert_eq!(
        start_order(&mut rx, 3).await,
        vec![ids[0], ids[0], ids[1], ids[2]]
    );
}

#[tokio::test]
async fn test_retried_task_stays_ahead_of_lower_priority() {
    let queue = queue_with(Arc::new(ScriptedProcessor::failing_first(1)), test_config(1));
    let mut rx = queue.subscribe();

    let low = submit(&queue, "low", TaskOptions::new().priority(TaskPriority::Low));
    let high = submit(&queue, "high", TaskOptions::new().priority(TaskPriority::High));
    queue.start();

    assert_eq!(start_order(&mut rx, 2).await, vec![high, high, low]);
    assert_eq!(queue.get_task(&high).unwrap().retries, 1);
    assert_eq!(queue.get_task(&low).unwrap().retries, 0);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_running_task_is_rejected() {
    let processor = Arc::new(ScriptedProcessor::succeeding().delay(Duration::from_millis(200)));
    let queue = queue_with(processor, test_config(1));
    let mut rx = queue.subscribe();

    let first = submit(&queue, "first", TaskOptions::new());
    let second = submit(&queue, "second", TaskOptions::new());
    queue.start();

    wait_for(&mut rx, |e| matches!(e, QueueEvent::TaskStarted { .. })).await;

    let before = queue.get_task(&first).unwrap();
    assert_eq!(before.status, TaskStatus::Running);
    assert!(!queue.cancel_task(&first));
    assert!(!queue.pause_task(&first));
    assert_eq!(queue.get_task(&first).unwrap(), before);

    assert!(queue.cancel_task(&second));
    let cancelled = wait_for(&mut rx, |e| matches!(e, QueueEvent::TaskCancelled { .. })).await;
    assert_eq!(cancelled.task().unwrap().id, second);

    let done = wait_for(&mut rx, is_terminal).await;
    assert_eq!(done.task().unwrap().id, first);
    assert_eq!(queue.get_task(&first).unwrap().status, TaskStatus::Completed);

    // The cancelled task never leaves its terminal state.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second_task = queue.get_task(&second).unwrap();
    assert_eq!(second_task.status, TaskStatus::Cancelled);
    assert!(second_task.start_time.is_none());
}

#[tokio::test]
async fn test_pause_pending_task_cancels_it() {
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));
    let id = submit(&queue, "paused", TaskOptions::new());

    assert!(queue.pause_task(&id));
    assert_eq!(queue.get_task(&id).unwrap().status, TaskStatus::Cancelled);
    assert!(queue.get_pending_tasks().is_empty());
}

// ── Start / stop ────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_keeps_pending_tasks_until_restart() {
    let processor = Arc::new(ScriptedProcessor::succeeding());
    let queue = queue_with(Arc::clone(&processor), test_config(2));
    let mut rx = queue.subscribe();

    queue.start();
    assert!(queue.is_running());
    assert!(matches!(next_event(&mut rx).await, QueueEvent::Started));

    queue.stop();
    assert!(!queue.is_running());
    assert!(matches!(next_event(&mut rx).await, QueueEvent::Stopped));

    let id = submit(&queue, "parked", TaskOptions::new());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queue.get_task(&id).unwrap().status, TaskStatus::Pending);
    assert_eq!(processor.calls(), 0);

    queue.start();
    let done = wait_for(&mut rx, is_terminal).await;
    assert!(matches!(done, QueueEvent::TaskCompleted { .. }));
    assert_eq!(queue.get_task(&id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_auto_start_inside_runtime() {
    let config = QueueConfig {
        auto_start: true,
        ..test_config(1)
    };
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), config);
    assert!(queue.is_running());

    let mut rx = queue.subscribe();
    let id = submit(&queue, "auto", TaskOptions::new());
    wait_for(&mut rx, is_terminal).await;
    assert_eq!(queue.get_task(&id).unwrap().status, TaskStatus::Completed);
}

#[test]
fn test_auto_start_without_runtime_stays_stopped() {
    let config = QueueConfig {
        auto_start: true,
        ..test_config(1)
    };
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), config);
    assert!(!queue.is_running());
}

// ── Callbacks ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_and_completion_callbacks() {
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));
    let mut rx = queue.subscribe();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(None));
    let progress_sink = Arc::clone(&progress);
    let completed_sink = Arc::clone(&completed);

    let id = submit(
        &queue,
        "hooks",
        TaskOptions::new()
            .on_progress(move |_, pct| progress_sink.lock().unwrap().push(pct))
            .on_complete(move |task, result| {
                *completed_sink.lock().unwrap() = Some((task.id, result.processed_path.clone()));
            }),
    );
    queue.start();
    wait_for(&mut rx, is_terminal).await;

    assert_eq!(*progress.lock().unwrap(), vec![0.0, 100.0]);
    assert_eq!(
        *completed.lock().unwrap(),
        Some((id, Some("out/hooks.txt".to_string())))
    );

    let task = queue.get_task(&id).unwrap();
    assert!(task.start_time.is_some());
    assert!(task.end_time.is_some());
    assert!(task.result.as_ref().unwrap().success);
    assert!(task.error.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_progress_hook_does_not_hold_back_other_tasks() {
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(2));
    let mut rx = queue.subscribe();

    let slow = submit(
        &queue,
        "slow",
        TaskOptions::new()
            .priority(TaskPriority::High)
            .on_progress(|_, pct| {
                if pct == 0.0 {
                    std::thread::sleep(Duration::from_millis(500));
                }
            }),
    );
    let quick = submit(&queue, "quick", TaskOptions::new());
    let begun = Instant::now();
    queue.start();

    wait_for(&mut rx, |e| {
        matches!(e, QueueEvent::TaskCompleted { task, .. } if task.id == quick)
    })
    .await;
    let elapsed = begun.elapsed();
    assert!(elapsed < Duration::from_millis(400), "quick task done after {elapsed:?}");
    assert_eq!(queue.get_task(&slow).unwrap().status, TaskStatus::Running);

    let done = wait_for(&mut rx, is_terminal).await;
    assert_eq!(done.task().unwrap().id, slow);
    assert!(matches!(done, QueueEvent::TaskCompleted { .. }));
}

#[tokio::test]
async fn test_panicking_callbacks_do_not_break_the_queue() {
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));
    let mut rx = queue.subscribe();

    let noisy = submit(
        &queue,
        "noisy",
        TaskOptions::new()
            .on_progress(|_, _| panic!("progress hook exploded"))
            .on_complete(|_, _| panic!("completion hook exploded")),
    );
    let quiet = submit(&queue, "quiet", TaskOptions::new());
    queue.start();

    let mut done = Vec::new();
    while done.len() < 2 {
        let event = wait_for(&mut rx, is_terminal).await;
        done.push(event.task().unwrap().id);
    }

    assert_eq!(done, vec![noisy, quiet]);
    assert_eq!(queue.get_task(&noisy).unwrap().status, TaskStatus::Completed);
    assert_eq!(queue.get_task(&quiet).unwrap().status, TaskStatus::Completed);
}

// ── Cleanup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cleanup_removes_only_terminal_tasks() {
    let queue = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));
    let mut rx = queue.subscribe();

    let done = submit(&queue, "done", TaskOptions::new());
    queue.start();
    wait_for(&mut rx, is_terminal).await;
    queue.stop();

    let waiting = submit(&queue, "waiting", TaskOptions::new());
    let dropped = submit(&queue, "dropped", TaskOptions::new());
    assert!(queue.cancel_task(&dropped));

    let report = queue.cleanup();
    assert_eq!(report.cleaned, 2);
    assert_eq!(report.remaining, 1);

    let event = wait_for(&mut rx, |e| matches!(e, QueueEvent::Cleanup(_))).await;
    assert!(matches!(event, QueueEvent::Cleanup(r) if r == report));

    assert!(queue.get_task(&done).is_none());
    assert!(queue.get_task(&dropped).is_none());
    assert_eq!(queue.get_task(&waiting).unwrap().status, TaskStatus::Pending);
    assert_eq!(queue.get_all_tasks().len(), 1);
}

// ── Independent instances ───────────────────────────────────────────

#[tokio::test]
async fn test_queues_are_independent() {
    let a = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));
    let b = queue_with(Arc::new(ScriptedProcessor::succeeding()), test_config(1));

    submit(&a, "only-in-a", TaskOptions::new());
    assert_eq!(a.len(), 1);
    assert!(b.is_empty());

    let a_clone = a.clone();
    submit(&a_clone, "shared", TaskOptions::new());
    assert_eq!(a.len(), 2);
}

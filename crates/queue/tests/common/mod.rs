//! Shared fixtures for queue integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fileq_core::{ProcessingOptions, ProcessingResult, ProcessorType, QueueConfig};
use fileq_queue::{FileProcessor, ManualClock, ProcessorError, QueueEvent};
use tokio::sync::broadcast;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Stopped queue, short tick and retry delay.
pub fn test_config(max_concurrent_tasks: usize) -> QueueConfig {
    QueueConfig {
        max_concurrent_tasks,
        max_retries: 2,
        retry_delay_ms: 20,
        task_timeout_ms: 5_000,
        tick_interval_ms: 50,
        auto_start: false,
        ..Default::default()
    }
}

pub fn document_options() -> ProcessingOptions {
    ProcessingOptions::default_for(ProcessorType::Document)
}

#[derive(Clone, Copy)]
enum Mode {
    Succeed,
    /// `Err` for every input containing the marker.
    FailOn(&'static str),
    /// `Ok` with `success == false` for every input.
    ReportFailure,
    /// Fail the first N calls, succeed afterwards.
    FailFirst(usize),
    Panic,
}

/// Configurable processor that records how it was driven.
pub struct ScriptedProcessor {
    ty: ProcessorType,
    delay: Duration,
    mode: Mode,
    clock: Option<Arc<ManualClock>>,
    calls: AtomicUsize,
    finished: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProcessor {
    fn with_mode(mode: Mode) -> Self {
        Self {
            ty: ProcessorType::Document,
            delay: Duration::from_millis(10),
            mode,
            clock: None,
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_mode(Mode::Succeed)
    }

    pub fn always_failing() -> Self {
        Self::with_mode(Mode::FailOn(""))
    }

    pub fn failing_on(marker: &'static str) -> Self {
        Self::with_mode(Mode::FailOn(marker))
    }

    pub fn reporting_failure() -> Self {
        Self::with_mode(Mode::ReportFailure)
    }

    pub fn failing_first(n: usize) -> Self {
        Self::with_mode(Mode::FailFirst(n))
    }

    pub fn panicking() -> Self {
        Self::with_mode(Mode::Panic)
    }

    pub fn of_type(mut self, ty: ProcessorType) -> Self {
        self.ty = ty;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Advance `clock` by the processing delay on every call instead of
    /// relying on wall time for recorded durations.
    pub fn advancing(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileProcessor for ScriptedProcessor {
    fn processor_type(&self) -> ProcessorType {
        self.ty
    }

    async fn process(
        &self,
        input_path: &str,
        output_path: &str,
        _options: &ProcessingOptions,
    ) -> Result<ProcessingResult, ProcessorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        if let Some(clock) = &self.clock {
            clock.advance(chrono::Duration::from_std(self.delay).unwrap());
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        match self.mode {
            Mode::Succeed => Ok(ProcessingResult::ok(output_path)),
            Mode::FailOn(marker) if input_path.contains(marker) => {
                Err(ProcessorError::Failed(format!("cannot process {input_path}")))
            }
            Mode::FailOn(_) => Ok(ProcessingResult::ok(output_path)),
            Mode::ReportFailure => Ok(ProcessingResult::failed("bad input")),
            Mode::FailFirst(n) if call < n => {
                Err(ProcessorError::Failed(format!("transient failure {call}")))
            }
            Mode::FailFirst(_) => Ok(ProcessingResult::ok(output_path)),
            Mode::Panic => panic!("decoder exploded"),
        }
    }

    fn supports(&self, _mime_type: &str) -> bool {
        true
    }
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a queue event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<QueueEvent>, pred: F) -> QueueEvent
where
    F: Fn(&QueueEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Whether `event` settles a task terminally.
pub fn is_terminal(event: &QueueEvent) -> bool {
    matches!(
        event,
        QueueEvent::TaskCompleted { .. } | QueueEvent::TaskFailed { .. }
    )
}

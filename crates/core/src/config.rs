use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Prefix for environment overrides: `FILEQ_<FIELD>` overrides `<field>`.
const ENV_PREFIX: &str = "FILEQ_";

// ── Queue config ──────────────────────────────────────────────

/// Processing queue configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of tasks in `running` status at once.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Retries granted to a task that does not set its own limit.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the extra dispatch wake scheduled after a retry.
    ///
    /// This is not a back-off. A retried task is pending again at once and
    /// may be re-dispatched immediately when a slot is free; the delay only
    /// guarantees one more dispatch pass later.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Scheduler-side deadline for a single processor invocation.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Fixed dispatch tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Start the dispatch loop as soon as the queue is built.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    /// Buffered events per subscriber before it starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub health: HealthThresholds,
}

fn default_max_concurrent_tasks() -> usize { 3 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 5_000 }
fn default_task_timeout_ms() -> u64 { 300_000 }
fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_auto_start() -> bool { true }
fn default_event_capacity() -> usize { 256 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            task_timeout_ms: default_task_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            auto_start: default_auto_start(),
            event_capacity: default_event_capacity(),
            health: HealthThresholds::default(),
        }
    }
}

/// Thresholds for the heuristic health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Success rate below this is an issue...
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// ...once more than this many tasks exist.
    #[serde(default = "default_success_rate_min_tasks")]
    pub success_rate_min_tasks: usize,
    /// More pending tasks than this is a backlog.
    #[serde(default = "default_max_pending_tasks")]
    pub max_pending_tasks: usize,
    /// Mean processing time above this is an issue.
    #[serde(default = "default_max_average_processing_ms")]
    pub max_average_processing_ms: f64,
}

fn default_min_success_rate() -> f64 { 0.8 }
fn default_success_rate_min_tasks() -> usize { 10 }
fn default_max_pending_tasks() -> usize { 50 }
fn default_max_average_processing_ms() -> f64 { 60_000.0 }

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            success_rate_min_tasks: default_success_rate_min_tasks(),
            max_pending_tasks: default_max_pending_tasks(),
            max_average_processing_ms: default_max_average_processing_ms(),
        }
    }
}

impl QueueConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        Self::from_toml_with(toml_str, |key| std::env::var(key).ok())
    }

    /// Parse config from a TOML string, taking overrides from `lookup`
    /// instead of the process environment.
    pub fn from_toml_with<F>(toml_str: &str, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent_tasks == 0 {
            return Err(CoreError::Config(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.task_timeout_ms == 0 {
            return Err(CoreError::Config("task_timeout_ms must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(CoreError::Config("tick_interval_ms must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::Config("event_capacity must be positive".into()));
        }
        let rate = self.health.min_success_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(CoreError::Config(format!(
                "health.min_success_rate {rate} out of range 0.0-1.0"
            )));
        }
        Ok(())
    }

    /// Print the effective settings for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Queue config:");
        tracing::info!(
            "  dispatch:  max_concurrent={}, tick={}ms, auto_start={}",
            self.max_concurrent_tasks,
            self.tick_interval_ms,
            self.auto_start
        );
        tracing::info!(
            "  retry:     max_retries={}, delay={}ms, timeout={}ms",
            self.max_retries,
            self.retry_delay_ms,
            self.task_timeout_ms
        );
        tracing::info!(
            "  health:    min_success_rate={}, max_pending={}, max_avg={}ms",
            self.health.min_success_rate,
            self.health.max_pending_tasks,
            self.health.max_average_processing_ms
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply `FILEQ_*` environment overrides.
    ///
    /// Examples:
    /// - `FILEQ_MAX_CONCURRENT_TASKS` -> `max_concurrent_tasks`
    /// - `FILEQ_TASK_TIMEOUT_MS` -> `task_timeout_ms`
    /// - `FILEQ_HEALTH_MAX_PENDING_TASKS` -> `health.max_pending_tasks`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (env in production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| lookup(&format!("{ENV_PREFIX}{field}"));

        override_parsed(&mut self.max_concurrent_tasks, "MAX_CONCURRENT_TASKS", get("MAX_CONCURRENT_TASKS"));
        override_parsed(&mut self.max_retries, "MAX_RETRIES", get("MAX_RETRIES"));
        override_parsed(&mut self.retry_delay_ms, "RETRY_DELAY_MS", get("RETRY_DELAY_MS"));
        override_parsed(&mut self.task_timeout_ms, "TASK_TIMEOUT_MS", get("TASK_TIMEOUT_MS"));
        override_parsed(&mut self.tick_interval_ms, "TICK_INTERVAL_MS", get("TICK_INTERVAL_MS"));
        override_parsed(&mut self.auto_start, "AUTO_START", get("AUTO_START"));
        override_parsed(&mut self.event_capacity, "EVENT_CAPACITY", get("EVENT_CAPACITY"));
        override_parsed(
            &mut self.health.min_success_rate,
            "HEALTH_MIN_SUCCESS_RATE",
            get("HEALTH_MIN_SUCCESS_RATE"),
        );
        override_parsed(
            &mut self.health.success_rate_min_tasks,
            "HEALTH_SUCCESS_RATE_MIN_TASKS",
            get("HEALTH_SUCCESS_RATE_MIN_TASKS"),
        );
        override_parsed(
            &mut self.health.max_pending_tasks,
            "HEALTH_MAX_PENDING_TASKS",
            get("HEALTH_MAX_PENDING_TASKS"),
        );
        override_parsed(
            &mut self.health.max_average_processing_ms,
            "HEALTH_MAX_AVERAGE_PROCESSING_MS",
            get("HEALTH_MAX_AVERAGE_PROCESSING_MS"),
        );
    }
}

fn override_parsed<T: FromStr>(slot: &mut T, field: &str, value: Option<String>) {
    let Some(raw) = value else { return };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!("ignoring unparsable {ENV_PREFIX}{field}={raw:?}"),
    }
}

//! fileq-worker: runs one batch manifest through a processing queue.
//!
//! Registers a pass-through `document` processor (a plain file copy),
//! submits every manifest entry as a single batch, waits for the batch to
//! settle and prints the per-task results, queue statistics and health
//! report as JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use fileq_core::{load_dotenv, ProcessingOptions, ProcessingResult, ProcessorType, QueueConfig};
use fileq_queue::{
    BatchOptions, BatchResults, BatchTaskSpec, FileProcessor, HealthReport, ProcessingQueue,
    ProcessorError, QueueStats,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a batch of file-processing tasks and report the outcome.
#[derive(Parser, Debug)]
#[command(name = "fileq-worker", version, about)]
struct Cli {
    /// Path to a fileq TOML config file. Defaults plus FILEQ_* overrides when absent.
    #[arg(long, env = "FILEQ_CONFIG")]
    config: Option<PathBuf>,

    /// JSON array of batch task specs.
    #[arg(long)]
    manifest: PathBuf,

    /// Give up waiting for the batch after this many seconds.
    #[arg(long, env = "FILEQ_WAIT_TIMEOUT_SECS", default_value_t = 600)]
    wait_timeout_secs: u64,
}

// ── CopyProcessor ───────────────────────────────────────────────────

/// Document processor that copies input to output unchanged.
struct CopyProcessor;

#[async_trait]
impl FileProcessor for CopyProcessor {
    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Document
    }

    async fn process(
        &self,
        input_path: &str,
        output_path: &str,
        _options: &ProcessingOptions,
    ) -> Result<ProcessingResult, ProcessorError> {
        let started = Instant::now();
        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = tokio::fs::copy(input_path, output_path).await?;

        let mut result = ProcessingResult::ok(output_path).with_size(bytes);
        result.processing_time_ms = Some(started.elapsed().as_millis() as u64);
        Ok(result)
    }

    fn supports(&self, mime_type: &str) -> bool {
        let mime = mime_type.to_ascii_lowercase();
        mime.starts_with("text/") || mime.starts_with("application/")
    }
}

#[derive(Serialize)]
struct Report {
    results: BatchResults,
    stats: QueueStats,
    health: HealthReport,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<QueueConfig> {
    match path {
        Some(path) => {
            let config = QueueConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            info!(path = %path.display(), "loaded queue config");
            Ok(config)
        }
        None => Ok(QueueConfig::from_env()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    config.log_summary();

    let manifest = tokio::fs::read_to_string(&cli.manifest)
        .await
        .with_context(|| format!("reading manifest {}", cli.manifest.display()))?;
    let specs: Vec<BatchTaskSpec> =
        serde_json::from_str(&manifest).context("parsing manifest")?;
    info!(tasks = specs.len(), "manifest loaded");

    let queue = ProcessingQueue::builder()
        .config(config)
        .processor(Arc::new(CopyProcessor))
        .build()?;
    queue.start();

    let (done_tx, done_rx) = oneshot::channel();
    queue.add_batch_tasks(
        specs,
        BatchOptions::new()
            .on_progress(|settled, total| info!(settled, total, "batch progress"))
            .on_complete(move |results| {
                let _ = done_tx.send(results);
            }),
    )?;

    let wait = Duration::from_secs(cli.wait_timeout_secs);
    let results = match tokio::time::timeout(wait, done_rx).await {
        Ok(Ok(results)) => results,
        Ok(Err(_)) => anyhow::bail!("batch completion hook dropped without reporting"),
        Err(_) => {
            warn!(timeout_secs = cli.wait_timeout_secs, "batch did not settle in time");
            anyhow::bail!("timed out after {}s waiting for batch", cli.wait_timeout_secs);
        }
    };
    queue.stop();

    let report = Report {
        results,
        stats: queue.stats(),
        health: queue.health(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let cleaned = queue.cleanup();
    info!(cleaned = cleaned.cleaned, "worker finished");
    Ok(())
}

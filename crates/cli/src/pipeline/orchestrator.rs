//! Pipeline orchestrator: reader task -> channel -> estimation loop.
//!
//! The estimator owns the fusion core and runs on the calling task, so every
//! insert (and any replay it triggers) completes before the next record is
//! taken from the channel.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::FusionConfig;
use numeric_kernel::every_nth;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::estimator::{Estimator, TrajectoryPoint};
use super::record::{read_records, InputRecord};
use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fusion: FusionConfig,

    /// Measurement log
    pub input: PathBuf,

    /// Trajectory output (None = no output)
    pub output: Option<PathBuf>,

    /// Keep every n-th trajectory point
    pub decimate: usize,

    /// Maximum number of records to process (None = unlimited)
    pub max_records: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel capacity
    pub buffer_size: usize,

    /// Print the final buffer contents
    pub dump_buffer: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();

        if !self.config.input.exists() {
            return Err(CliError::input_not_found(self.config.input.display().to_string()).into());
        }

        let mut estimator =
            Estimator::new(&self.config.fusion).context("Failed to set up the estimator")?;

        let (tx, mut rx) = mpsc::channel(self.config.buffer_size.max(1));
        let reader = tokio::spawn(read_records(self.config.input.clone(), tx));
        info!(input = %self.config.input.display(), "Reader started");

        let mut stats = PipelineStats::default();
        let timed_out = run_estimation(
            &mut estimator,
            &mut rx,
            &mut stats,
            self.config.max_records,
            self.config.timeout,
        )
        .await
        .context("Estimation loop failed")?;
        if timed_out {
            warn!(
                records = stats.records_processed,
                skipped = stats.records_skipped,
                "Replay timed out"
            );
        }

        // Closing the channel stops a reader that is still running
        drop(rx);
        match reader.await {
            Ok(Ok(lines)) => info!(lines, "Reader finished"),
            Ok(Err(e)) => warn!(error = %e, "Reader stopped with an error"),
            Err(e) => warn!(error = %e, "Reader task failed"),
        }

        if let Some(path) = &self.config.output {
            let points = decimate(estimator.trajectory(), self.config.decimate);
            write_trajectory(path, &points)
                .with_context(|| format!("Failed to write trajectory to {}", path.display()))?;
            stats.points_written = points.len();
            info!(path = %path.display(), points = points.len(), "Trajectory written");
        }

        if self.config.dump_buffer {
            println!("{}", estimator.core().render_buffer());
        }

        let core = estimator.core();
        stats.core = core.stats().clone();
        stats.buffer = core.buffer_stats();
        stats.metrics = estimator.metrics().summary();
        observability::record_buffer_stats(&stats.buffer);
        stats.duration = start_time.elapsed();

        Ok(stats)
    }
}

/// Estimation loop bounded by `timeout`. Returns `true` when it timed out.
///
/// Record counts are written into `stats` as records are handled, so they
/// are kept when the loop is cut short.
async fn run_estimation(
    estimator: &mut Estimator,
    rx: &mut mpsc::Receiver<crate::error::Result<InputRecord>>,
    stats: &mut PipelineStats,
    max_records: Option<u64>,
    timeout: Option<Duration>,
) -> Result<bool, CliError> {
    let estimation = estimate(estimator, rx, stats, max_records);
    match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, estimation).await {
            Ok(outcome) => outcome.map(|()| false),
            Err(_) => Ok(true),
        },
        None => estimation.await.map(|()| false),
    }
}

async fn estimate(
    estimator: &mut Estimator,
    rx: &mut mpsc::Receiver<crate::error::Result<InputRecord>>,
    stats: &mut PipelineStats,
    max_records: Option<u64>,
) -> Result<(), CliError> {
    while let Some(item) = rx.recv().await {
        match item.and_then(|record| estimator.process(record)) {
            Ok(()) => stats.records_processed += 1,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Skipping record");
                stats.records_skipped += 1;
            }
            Err(e) => return Err(e),
        }

        if let Some(max) = max_records {
            if stats.records_processed >= max {
                info!(records = stats.records_processed, "Reached max records limit");
                break;
            }
        }
    }
    Ok(())
}

fn decimate(points: &[TrajectoryPoint], n: usize) -> Vec<TrajectoryPoint> {
    if n <= 1 {
        points.to_vec()
    } else {
        every_nth(points, n)
    }
}

/// One JSON object per line
fn write_trajectory(path: &std::path::Path, points: &[TrajectoryPoint]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for point in points {
        serde_json::to_writer(&mut out, point)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

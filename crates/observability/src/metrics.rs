//! Fusion session metrics
//!
//! Prometheus recording helpers for the ingest pipeline and an in-memory
//! aggregator over [`InsertOutcome`]s for end-of-run summaries.

use std::collections::HashMap;

use contracts::{Arrival, BufferStats, FusionError, InsertOutcome};
use metrics::{counter, gauge, histogram};

/// Record the metrics of one accepted insert
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_insert;
///
/// let outcome = core.insert(handle, t, payload)?;
/// record_insert(&outcome);
/// ```
pub fn record_insert(outcome: &InsertOutcome) {
    counter!(
        "fusion_inserts_total",
        "sensor" => outcome.sensor.to_string(),
        "arrival" => outcome.arrival.as_str()
    )
    .increment(1);

    if let Some(replay) = &outcome.replay {
        histogram!("fusion_replay_superseded_states").record(replay.superseded_states as f64);
        gauge!("fusion_replay_last_from_index").set(replay.from_index as f64);
    }

    if !outcome.update_valid {
        counter!(
            "fusion_inserts_invalid_total",
            "sensor" => outcome.sensor.to_string()
        )
        .increment(1);
    }
}

/// Record a measurement rejected at the core boundary
pub fn record_rejection(sensor: &str, error: &FusionError) {
    counter!(
        "fusion_inserts_rejected_total",
        "sensor" => sensor.to_string(),
        "reason" => error.reason()
    )
    .increment(1);
}

/// Record a raw record read from the input stream
pub fn record_record_received(sensor: &str) {
    counter!(
        "fusion_records_received_total",
        "sensor" => sensor.to_string()
    )
    .increment(1);
}

/// Record the wall-clock time spent in one insert
pub fn record_insert_latency_us(latency_us: f64) {
    histogram!("fusion_insert_latency_us").record(latency_us);
}

/// Record the buffer shape
pub fn record_buffer_stats(stats: &BufferStats) {
    gauge!("fusion_buffer_states").set(stats.states as f64);
    gauge!("fusion_buffer_measurements").set(stats.measurements as f64);
    gauge!("fusion_buffer_span_seconds").set(stats.span());
}

/// Insert metrics aggregator
///
/// Aggregates in memory for the summary printed at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct FusionMetricsAggregator {
    pub total_inserts: u64,
    pub out_of_order: u64,
    pub replays: u64,
    pub invalid_updates: u64,
    pub evicted: u64,

    /// Rejections by reason
    pub rejections: HashMap<&'static str, u64>,

    /// Superseded checkpoints per replay
    pub replay_stats: RunningStats,

    /// Out-of-order delay: latest checkpoint time minus measurement time (ms)
    pub delay_stats: RunningStats,

    /// Accepted inserts per sensor
    pub sensor_counts: HashMap<String, u64>,

    latest_timestamp: Option<f64>,
}

impl FusionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, outcome: &InsertOutcome) {
        self.total_inserts += 1;
        self.evicted += outcome.evicted as u64;
        if !outcome.update_valid {
            self.invalid_updates += 1;
        }
        *self
            .sensor_counts
            .entry(outcome.sensor.to_string())
            .or_insert(0) += 1;

        let timestamp = outcome.timestamp.as_secs();
        match outcome.arrival {
            Arrival::OutOfOrder => {
                self.out_of_order += 1;
                if let Some(latest) = self.latest_timestamp {
                    self.delay_stats.push((latest - timestamp) * 1000.0);
                }
            }
            Arrival::InOrder => {
                self.latest_timestamp = Some(
                    self.latest_timestamp
                        .map_or(timestamp, |latest| latest.max(timestamp)),
                );
            }
        }

        if let Some(replay) = &outcome.replay {
            self.replays += 1;
            self.replay_stats.push(replay.superseded_states as f64);
        }
    }

    pub fn record_rejection(&mut self, error: &FusionError) {
        *self.rejections.entry(error.reason()).or_insert(0) += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let rejected: u64 = self.rejections.values().sum();
        let attempted = self.total_inserts + rejected;
        MetricsSummary {
            total_inserts: self.total_inserts,
            rejected,
            out_of_order: self.out_of_order,
            replays: self.replays,
            invalid_updates: self.invalid_updates,
            evicted: self.evicted,
            out_of_order_rate: percentage(self.out_of_order, self.total_inserts),
            rejection_rate: percentage(rejected, attempted),
            superseded_per_replay: StatsSummary::from(&self.replay_stats),
            out_of_order_delay_ms: StatsSummary::from(&self.delay_stats),
            rejections: self.rejections.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_inserts: u64,
    pub rejected: u64,
    pub out_of_order: u64,
    pub replays: u64,
    pub invalid_updates: u64,
    pub evicted: u64,
    pub out_of_order_rate: f64,
    pub rejection_rate: f64,
    pub superseded_per_replay: StatsSummary,
    pub out_of_order_delay_ms: StatsSummary,
    pub rejections: HashMap<&'static str, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Fusion Metrics Summary ===")?;
        writeln!(f, "Accepted inserts: {}", self.total_inserts)?;
        writeln!(
            f,
            "Rejected inserts: {} ({:.2}%)",
            self.rejected, self.rejection_rate
        )?;
        writeln!(
            f,
            "Out-of-order inserts: {} ({:.2}%)",
            self.out_of_order, self.out_of_order_rate
        )?;
        writeln!(f, "Replays: {}", self.replays)?;
        writeln!(f, "Invalid updates: {}", self.invalid_updates)?;
        writeln!(f, "Evicted entries: {}", self.evicted)?;
        writeln!(f, "Superseded states per replay: {}", self.superseded_per_replay)?;
        writeln!(f, "Out-of-order delay (ms): {}", self.out_of_order_delay_ms)?;

        if !self.rejections.is_empty() {
            writeln!(f, "Rejections:")?;
            let mut reasons: Vec<_> = self.rejections.iter().collect();
            reasons.sort();
            for (reason, count) in reasons {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

//! Run statistics.

use std::time::Duration;

use contracts::{BufferStats, CoreStats};
use observability::MetricsSummary;

/// Statistics from a replay run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Log records handed to the estimator
    pub records_processed: u64,

    /// Log lines that could not be decoded or named an unknown sensor
    pub records_skipped: u64,

    /// Trajectory points written to the output
    pub points_written: usize,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Lifetime counters of the fusion core
    pub core: CoreStats,

    /// Buffer shape at the end of the run
    pub buffer: BufferStats,

    /// Insert metrics
    pub metrics: MetricsSummary,
}

impl PipelineStats {
    /// Records processed per wall-clock second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.records_processed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n=== Replay Statistics ===\n");
        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Records processed: {}", self.records_processed);
        println!("   ├─ Records skipped: {}", self.records_skipped);
        println!("   ├─ Throughput: {:.0} records/s", self.throughput());
        println!("   └─ Trajectory points written: {}", self.points_written);

        println!("\nFusion core");
        println!("   ├─ Accepted: {}", self.core.accepted);
        println!("   ├─ Rejected: {}", self.core.rejected);
        println!("   ├─ Out-of-order: {}", self.core.out_of_order);
        println!(
            "   ├─ Replays: {} ({} aborted)",
            self.core.replays, self.core.aborted_replays
        );
        println!("   ├─ Superseded states: {}", self.core.superseded_states);
        println!("   ├─ Invalid updates: {}", self.core.invalid_updates);
        println!("   └─ Evicted: {}", self.core.evicted);

        println!("\nBuffer");
        println!("   ├─ Entries: {}", self.buffer.total_entries);
        println!(
            "   ├─ States / measurements: {} / {}",
            self.buffer.states, self.buffer.measurements
        );
        println!("   └─ Span: {:.3}s", self.buffer.span());

        println!("\n{}", self.metrics);
    }
}

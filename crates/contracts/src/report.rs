//! Insert / replay reports - fusion core output
//!
//! Plain data handed back to the caller after every buffer mutation, and
//! consumed by observability for metrics.

use serde::{Deserialize, Serialize};

use crate::{SensorId, Time};

/// How a measurement ranked against the latest state checkpoint on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrival {
    /// Newer than (or as new as) every checkpoint, appended
    InOrder,
    /// Older than the latest checkpoint, spliced and replayed
    OutOfOrder,
}

impl Arrival {
    pub const fn as_str(self) -> &'static str {
        match self {
            Arrival::InOrder => "in_order",
            Arrival::OutOfOrder => "out_of_order",
        }
    }
}

/// Summary of one replay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Buffer index the replay started from
    pub from_index: usize,

    /// Timestamp of the checkpoint the replay was anchored on
    pub anchor_timestamp: Time,

    /// Measurements re-processed
    pub replayed_measurements: usize,

    /// Derived checkpoints dropped and regenerated
    pub superseded_states: usize,

    /// Checkpoints that failed covariance validation after the replay and
    /// did not before it
    pub invalid_updates: usize,

    /// Whether the checkpoint derived from the measurement at `from_index`
    /// passed covariance validation
    pub measurement_valid: bool,
}

/// Result of one insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOutcome {
    /// Sensor that produced the measurement
    pub sensor: SensorId,

    /// Measurement timestamp
    pub timestamp: Time,

    /// Buffer index of the measurement after the insert (before eviction)
    pub index: usize,

    /// In-order or out-of-order arrival
    pub arrival: Arrival,

    /// Set when the insert triggered a replay
    pub replay: Option<ReplayReport>,

    /// Whether the checkpoint derived from this measurement passed covariance validation
    pub update_valid: bool,

    /// Entries evicted after the insert
    pub evicted: usize,
}

impl InsertOutcome {
    /// Whether the insert caused a replay
    pub fn replayed(&self) -> bool {
        self.replay.is_some()
    }
}

/// Buffer status (for diagnostics)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Total entries
    pub total_entries: usize,

    /// State checkpoints (core, sensor, init)
    pub states: usize,

    /// Measurements (in-order and out-of-order)
    pub measurements: usize,

    /// Measurements tagged out-of-order
    pub out_of_order_measurements: usize,

    /// Oldest timestamp
    pub oldest_timestamp: Option<Time>,

    /// Newest timestamp
    pub newest_timestamp: Option<Time>,
}

impl BufferStats {
    /// Time covered by the buffer, zero when empty
    pub fn span(&self) -> f64 {
        match (self.oldest_timestamp, self.newest_timestamp) {
            (Some(oldest), Some(newest)) => newest - oldest,
            _ => 0.0,
        }
    }
}

/// Lifetime counters of a fusion session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    /// Measurements accepted
    pub accepted: u64,
    /// Measurements rejected at the boundary
    pub rejected: u64,
    /// Accepted measurements that arrived out of order
    pub out_of_order: u64,
    /// Replays run
    pub replays: u64,
    /// Checkpoints superseded by replays
    pub superseded_states: u64,
    /// Entries evicted
    pub evicted: u64,
    /// Updates that failed covariance validation
    pub invalid_updates: u64,
    /// Replays aborted and rolled back
    pub aborted_replays: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_span() {
        let stats = BufferStats {
            oldest_timestamp: Some(Time::from_secs(1.0)),
            newest_timestamp: Some(Time::from_secs(3.5)),
            ..Default::default()
        };
        assert!((stats.span() - 2.5).abs() < 1e-12);
        assert_eq!(BufferStats::default().span(), 0.0);
    }
}

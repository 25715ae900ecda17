//! Measurement log records and the reader task that streams them.
//!
//! One JSON object per line:
//!
//! ```text
//! {"t": 0.010, "sensor": "imu", "imu": {"acc": [0.0, 0.0, 9.81], "gyro": [0.0, 0.0, 0.0]}}
//! {"t": 0.100, "sensor": "gps", "position": [1.0, 2.0, 0.5]}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::PathBuf;

use contracts::{ImuMeasurement, MeasurementPayload, PositionMeasurement};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CliError, Result};

/// One decoded log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Line number in the log (1-based)
    #[serde(skip)]
    pub line: usize,

    /// Measurement timestamp (s)
    pub t: f64,

    /// Sensor name as configured
    pub sensor: String,

    #[serde(flatten)]
    pub data: RecordData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordData {
    Imu { acc: [f64; 3], gyro: [f64; 3] },
    Position([f64; 3]),
}

impl RecordData {
    pub fn into_payload(self) -> MeasurementPayload {
        match self {
            RecordData::Imu { acc, gyro } => {
                ImuMeasurement::new(Vector3::from(acc), Vector3::from(gyro)).into()
            }
            RecordData::Position(p) => PositionMeasurement::new(Vector3::from(p)).into(),
        }
    }
}

/// Decode one line; `Ok(None)` for blank and comment lines
pub fn parse_line(line: usize, text: &str) -> Result<Option<InputRecord>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut record: InputRecord = serde_json::from_str(trimmed)
        .map_err(|e| CliError::malformed_record(line, e.to_string()))?;
    record.line = line;
    Ok(Some(record))
}

/// Stream the log into `tx` in file order.
///
/// Malformed lines are forwarded as errors so the consumer can count them.
/// Stops early when the receiver is dropped. Returns the number of lines read.
pub async fn read_records(path: PathBuf, tx: mpsc::Sender<Result<InputRecord>>) -> Result<usize> {
    let file = File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;

    while let Some(text) = lines.next_line().await? {
        line_no += 1;
        let item = match parse_line(line_no, &text) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => continue,
            Err(e) => Err(e),
        };
        if tx.send(item).await.is_err() {
            debug!(line = line_no, "Record channel closed, reader stopping");
            break;
        }
    }

    debug!(lines = line_no, path = %path.display(), "Reader finished");
    Ok(line_no)
}

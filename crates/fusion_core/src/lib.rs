//! # Fusion Core
//!
//! Time-synchronized buffer with out-of-order correction.
//!
//! Responsibilities:
//! - keep state checkpoints and measurements sorted by timestamp
//! - derive one checkpoint per accepted measurement through the registered
//!   propagation / update collaborators
//! - splice late measurements and replay every later checkpoint
//! - bound the buffer by entry count and time span
//!
//! ## Usage
//!
//! ```ignore
//! use fusion_core::{models, FusionCore};
//!
//! let mut core = models::build_core(&config)?;
//! let imu = core.sensor("imu").unwrap();
//! core.initialize(t0, initializer.snapshot()?)?;
//!
//! let outcome = core.insert(imu, t, reading.into())?;
//! if let Some(replay) = outcome.replay {
//!     tracing::debug!(replayed = replay.replayed_measurements, "late measurement");
//! }
//! ```

mod buffer;
mod engine;
mod entry;
pub mod models;

pub use buffer::SyncBuffer;
pub use engine::{EngineConfig, FusionCore};
pub use entry::{BufferEntry, EntryDisplay, EntryKind, EntryPayload};

// Re-export contracts types
pub use contracts::{
    Arrival, BufferConfig, BufferStats, CoreStats, InsertOutcome, ReplayReport, SensorHandle,
    Time,
};

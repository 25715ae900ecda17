//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the fusion workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Timestamps are monotonic seconds stored as `f64` ([`Time`])
//! - Entries with equal timestamps are ordered by arrival (insertion sequence)
//!
//! ## Ownership Model
//! - Sensors live in a [`SensorRegistry`] handle table
//! - Buffer entries refer to sensors through the copyable [`SensorHandle`]

mod collaborator;
mod config;
mod error;
mod measurement;
mod report;
mod sensor;
mod state;
mod time;

pub use collaborator::*;
pub use config::*;
pub use error::*;
pub use measurement::*;
pub use report::*;
pub use sensor::*;
pub use state::*;
pub use time::Time;

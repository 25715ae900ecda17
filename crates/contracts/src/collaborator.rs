//! Collaborator traits - the filter models the buffer drives
//!
//! The buffer never knows how a sensor is modelled. It calls a
//! [`StatePropagator`] for every time gap and a [`MeasurementUpdater`] for every
//! update-sensor measurement, in timestamp order, both during normal insertion
//! and during replay.
//!
//! # Determinism
//!
//! Implementations must be pure functions of their arguments (`&self`, no
//! interior mutability). Replay relies on this to reproduce the checkpoints of
//! a sorted arrival bit for bit.
//!
//! # Example
//!
//! ```ignore
//! let handle = core.register_update_sensor("gps", Box::new(PositionUpdater::new(noise)))?;
//! core.insert(handle, Time::from_secs(12.0), PositionMeasurement::new(p).into())?;
//! ```

use crate::{FusionError, MeasurementPayload, StateSnapshot, UpdateOutcome};

/// Propagation collaborator
pub trait StatePropagator: Send {
    /// Advance `prior` by `dt` seconds.
    ///
    /// `input` is the propagation sensor's new reading when the gap ends at one
    /// of its measurements, and `None` when the gap ends at an update-sensor
    /// measurement (the model then holds the last reading stored in `prior`).
    ///
    /// `dt` is never negative.
    fn propagate(
        &self,
        prior: &StateSnapshot,
        input: Option<&MeasurementPayload>,
        dt: f64,
    ) -> Result<StateSnapshot, FusionError>;
}

/// Update collaborator
pub trait MeasurementUpdater: Send {
    /// Correct `prior` (already propagated to the measurement time) with `measurement`.
    fn update(
        &self,
        prior: &StateSnapshot,
        measurement: &MeasurementPayload,
    ) -> Result<UpdateOutcome, FusionError>;
}

//! State checkpoints stored in the buffer.

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Dimension of the core error state `[δp δv δθ δb_w δb_a]`
pub const CORE_ERROR_STATE_DIM: usize = 15;

/// Offsets of the core error-state blocks
pub mod error_state {
    pub const POSITION: usize = 0;
    pub const VELOCITY: usize = 3;
    pub const ATTITUDE: usize = 6;
    pub const GYRO_BIAS: usize = 9;
    pub const ACCEL_BIAS: usize = 12;
}

/// Nominal core state
///
/// Orientation maps body to world. The last IMU reading is part of the state so
/// that a propagation over a gap without a new reading (before an update) can
/// hold it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreState {
    /// Position in world frame (m)
    pub position: Vector3<f64>,

    /// Velocity in world frame (m/s)
    pub velocity: Vector3<f64>,

    /// Body to world rotation
    pub orientation: UnitQuaternion<f64>,

    /// Gyroscope bias (rad/s)
    pub gyro_bias: Vector3<f64>,

    /// Accelerometer bias (m/s²)
    pub accel_bias: Vector3<f64>,

    /// Last angular-rate reading (rad/s)
    pub angular_velocity: Vector3<f64>,

    /// Last specific-force reading (m/s²)
    pub linear_acceleration: Vector3<f64>,
}

impl Default for CoreState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            gyro_bias: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }
}

/// Sensor-specific state (calibration, offsets) estimated next to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub values: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// One checkpoint: nominal state plus error-state covariance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Nominal core state
    pub core: CoreState,

    /// Error-state covariance (dimension chosen by the propagation model)
    pub covariance: DMatrix<f64>,

    /// Optional sensor-specific state produced by an update
    pub sensor: Option<SensorState>,
}

impl StateSnapshot {
    pub fn new(core: CoreState, covariance: DMatrix<f64>) -> Self {
        Self {
            core,
            covariance,
            sensor: None,
        }
    }

    /// Attach a sensor-specific state
    pub fn with_sensor_state(mut self, sensor: SensorState) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Covariance dimension
    pub fn dim(&self) -> usize {
        self.covariance.nrows()
    }
}

/// Result of a measurement update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Corrected checkpoint
    pub snapshot: StateSnapshot,

    /// `false` when the corrected covariance failed the validity checks
    pub valid: bool,
}

//! FusionConfig - Config Loader output
//!
//! Describes one estimation session: buffer bound, numeric tolerances, the
//! propagation model, initialization and the list of sensors.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{SensorId, SensorRole};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FusionConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Buffer bound
    #[serde(default)]
    #[validate(nested)]
    pub buffer: BufferConfig,

    /// Covariance validity tolerances
    #[serde(default)]
    #[validate(nested)]
    pub covariance: CovarianceConfig,

    /// Core propagation model
    #[validate(nested)]
    pub core: CoreConfig,

    /// Filter initialization
    #[serde(default)]
    #[validate(nested)]
    pub init: InitConfig,

    /// Sensors feeding the filter
    pub sensors: Vec<SensorConfig>,
}

impl FusionConfig {
    /// Find a sensor by name
    pub fn sensor(&self, name: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.name.as_str() == name)
    }

    /// The sensor driving propagation, if it is configured
    pub fn propagation_sensor(&self) -> Option<&SensorConfig> {
        self.sensor(self.core.propagation_sensor.as_str())
    }

    /// Every sensor except the propagation sensor
    pub fn update_sensors(&self) -> impl Iterator<Item = &SensorConfig> {
        self.sensors
            .iter()
            .filter(move |s| s.name != self.core.propagation_sensor)
    }
}

/// Buffer bound
///
/// Both limits apply; the span limit is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BufferConfig {
    /// Maximum number of retained entries
    #[validate(range(min = 2))]
    pub max_entries: usize,

    /// Maximum time span between the oldest and newest entry (seconds)
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0))]
    pub max_span_s: Option<f64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_entries: 400,
            max_span_s: None,
        }
    }
}

/// Tolerances for covariance validity checks
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CovarianceConfig {
    /// Max |P - Pᵀ| relative to max(1, max |P|)
    #[validate(range(min = 0.0))]
    pub symmetry_tolerance: f64,

    /// Most negative eigenvalue tolerated, relative to max(1, largest |eigenvalue|)
    #[validate(range(min = 0.0))]
    pub eigen_tolerance: f64,

    /// Largest accepted condition number when the condition check is enabled
    #[validate(range(exclusive_min = 1.0))]
    pub condition_limit: f64,

    /// Run the condition-number check on update covariances
    #[serde(default)]
    pub check_condition: bool,
}

impl Default for CovarianceConfig {
    fn default() -> Self {
        Self {
            symmetry_tolerance: 1e-9,
            eigen_tolerance: 1e-12,
            condition_limit: 1e12,
            check_condition: false,
        }
    }
}

/// Core propagation model
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CoreConfig {
    /// Name of the sensor that drives propagation
    pub propagation_sensor: SensorId,

    /// Gravity magnitude (m/s²), acting along world -z
    #[serde(default = "default_gravity")]
    #[validate(range(exclusive_min = 0.0))]
    pub gravity: f64,

    /// Taylor order of the attitude matrix exponential
    #[serde(default = "default_matexp_order")]
    #[validate(range(min = 1, max = 12))]
    pub matexp_order: i32,

    /// Keep the propagated state when an update fails covariance validation
    #[serde(default)]
    pub reject_invalid_updates: bool,

    /// IMU noise densities
    #[serde(default)]
    #[validate(nested)]
    pub imu_noise: ImuNoiseConfig,
}

fn default_gravity() -> f64 {
    9.81
}

fn default_matexp_order() -> i32 {
    4
}

/// IMU noise densities (continuous time)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImuNoiseConfig {
    /// Gyroscope white noise (rad/s/√Hz)
    #[validate(range(min = 0.0))]
    pub gyro_noise: f64,

    /// Accelerometer white noise (m/s²/√Hz)
    #[validate(range(min = 0.0))]
    pub accel_noise: f64,

    /// Gyroscope bias random walk (rad/s²/√Hz)
    #[validate(range(min = 0.0))]
    pub gyro_bias_walk: f64,

    /// Accelerometer bias random walk (m/s³/√Hz)
    #[validate(range(min = 0.0))]
    pub accel_bias_walk: f64,
}

impl Default for ImuNoiseConfig {
    fn default() -> Self {
        Self {
            gyro_noise: 0.013,
            accel_noise: 0.083,
            gyro_bias_walk: 0.0013,
            accel_bias_walk: 0.0083,
        }
    }
}

/// Filter initialization
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitConfig {
    /// Propagation readings averaged for the static attitude estimate
    #[validate(range(min = 1))]
    pub static_samples: usize,

    /// Initial position (m)
    #[serde(default)]
    pub position: [f64; 3],

    /// Initial velocity (m/s)
    #[serde(default)]
    pub velocity: [f64; 3],

    /// Initial standard deviations
    #[serde(default)]
    #[validate(nested)]
    pub std: InitialStdConfig,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            static_samples: 1,
            position: [0.0; 3],
            velocity: [0.0; 3],
            std: InitialStdConfig::default(),
        }
    }
}

/// Initial standard deviations of the core error state
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitialStdConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub position: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub velocity: f64,
    /// Attitude (rad)
    #[validate(range(exclusive_min = 0.0))]
    pub attitude: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub gyro_bias: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub accel_bias: f64,
}

impl Default for InitialStdConfig {
    fn default() -> Self {
        Self {
            position: 0.5,
            velocity: 0.3,
            attitude: 0.1,
            gyro_bias: 0.01,
            accel_bias: 0.1,
        }
    }
}

/// Sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Imu,
    Position,
}

impl SensorKind {
    /// Registry role of this kind
    pub fn role(self) -> SensorRole {
        match self {
            SensorKind::Imu => SensorRole::Propagation,
            SensorKind::Position => SensorRole::Update,
        }
    }
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Unique sensor name
    pub name: SensorId,

    /// Sensor kind
    pub kind: SensorKind,

    /// Measurement noise standard deviation per axis (update sensors)
    #[serde(default)]
    pub noise_std: Option<[f64; 3]>,

    /// Rigid mounting of the sensor frame relative to the body frame
    #[serde(default)]
    pub mounting: Option<MountingConfig>,
}

/// Rigid mounting: translation (m) and rotation quaternion `[w, x, y, z]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MountingConfig {
    #[serde(default)]
    pub translation: [f64; 3],

    #[serde(default = "identity_wxyz")]
    pub rotation: [f64; 4],
}

fn identity_wxyz() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

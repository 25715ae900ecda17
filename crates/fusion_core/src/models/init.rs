//! Static initialization from the first IMU readings.

use contracts::error_state::{ACCEL_BIAS, ATTITUDE, GYRO_BIAS, POSITION, VELOCITY};
use contracts::{CoreState, FusionError, ImuMeasurement, InitConfig, StateSnapshot, CORE_ERROR_STATE_DIM};
use nalgebra::{DMatrix, UnitQuaternion, Vector3};
use numeric_kernel::average_quaternions;

/// Collects IMU readings while the platform is at rest and builds the
/// initialization checkpoint from them.
///
/// Each accelerometer sample yields the rotation that aligns it with world
/// +z; the per-sample attitudes are merged with [`average_quaternions`].
/// Yaw is unobservable at rest and stays at zero.
#[derive(Debug, Clone)]
pub struct StaticInitializer {
    config: InitConfig,
    samples: Vec<ImuMeasurement>,
}

impl StaticInitializer {
    pub fn new(config: InitConfig) -> Self {
        let capacity = config.static_samples;
        Self {
            config,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Add a reading; returns `true` once enough readings are collected
    pub fn push(&mut self, sample: ImuMeasurement) -> bool {
        if !self.is_ready() {
            self.samples.push(sample);
        }
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.config.static_samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Build the initialization snapshot.
    ///
    /// # Errors
    /// `EmptyInput` when no reading was collected.
    pub fn snapshot(&self) -> Result<StateSnapshot, FusionError> {
        let attitudes: Vec<UnitQuaternion<f64>> = self
            .samples
            .iter()
            .map(|s| {
                UnitQuaternion::rotation_between(&s.linear_acceleration, &Vector3::z())
                    .unwrap_or_else(UnitQuaternion::identity)
            })
            .collect();
        let orientation = average_quaternions(&attitudes)?;

        let n = self.samples.len() as f64;
        let mean_gyro = self
            .samples
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, s| acc + s.angular_velocity)
            / n;
        let mean_acc = self
            .samples
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, s| acc + s.linear_acceleration)
            / n;

        let core = CoreState {
            position: Vector3::from(self.config.position),
            velocity: Vector3::from(self.config.velocity),
            orientation,
            gyro_bias: mean_gyro,
            accel_bias: Vector3::zeros(),
            angular_velocity: mean_gyro,
            linear_acceleration: mean_acc,
        };

        let std = &self.config.std;
        let mut covariance = DMatrix::zeros(CORE_ERROR_STATE_DIM, CORE_ERROR_STATE_DIM);
        for (offset, sigma) in [
            (POSITION, std.position),
            (VELOCITY, std.velocity),
            (ATTITUDE, std.attitude),
            (GYRO_BIAS, std.gyro_bias),
            (ACCEL_BIAS, std.accel_bias),
        ] {
            for i in offset..offset + 3 {
                covariance[(i, i)] = sigma * sigma;
            }
        }

        Ok(StateSnapshot::new(core, covariance))
    }
}

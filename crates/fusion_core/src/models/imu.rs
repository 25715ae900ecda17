//! Strapdown IMU propagation on the 15-state core error layout.

use contracts::error_state::{ACCEL_BIAS, ATTITUDE, GYRO_BIAS, POSITION, VELOCITY};
use contracts::{
    CoreConfig, FusionError, ImuMeasurement, ImuNoiseConfig, MeasurementPayload, SensorId,
    StatePropagator, StateSnapshot, CORE_ERROR_STATE_DIM,
};
use nalgebra::{DMatrix, Matrix3, Vector3};
use numeric_kernel::{
    enforce_symmetry, matrix_exponential, omega_matrix, quaternion_from_wxyz, quaternion_to_wxyz,
    skew,
};

/// IMU propagation model
///
/// Integrates the mean of the previous and current bias-corrected readings.
/// Attitude uses the truncated exponential of `½ Ω(ω̂) dt`.
#[derive(Debug, Clone)]
pub struct ImuPropagator {
    sensor: SensorId,
    gravity: Vector3<f64>,
    matexp_order: i32,
    noise: ImuNoiseConfig,
}

impl ImuPropagator {
    pub fn new(sensor: impl Into<SensorId>, config: &CoreConfig) -> Self {
        Self {
            sensor: sensor.into(),
            gravity: Vector3::new(0.0, 0.0, -config.gravity),
            matexp_order: config.matexp_order,
            noise: config.imu_noise.clone(),
        }
    }

    /// Error-state transition for one step
    fn transition(
        &self,
        rotation: &Matrix3<f64>,
        acc: &Vector3<f64>,
        gyro: &Vector3<f64>,
        dt: f64,
    ) -> DMatrix<f64> {
        let eye = Matrix3::<f64>::identity();
        let mut f = DMatrix::identity(CORE_ERROR_STATE_DIM, CORE_ERROR_STATE_DIM);

        f.fixed_view_mut::<3, 3>(POSITION, VELOCITY)
            .copy_from(&(eye * dt));
        f.fixed_view_mut::<3, 3>(VELOCITY, ATTITUDE)
            .copy_from(&(-rotation * skew(acc) * dt));
        f.fixed_view_mut::<3, 3>(VELOCITY, ACCEL_BIAS)
            .copy_from(&(-rotation * dt));
        f.fixed_view_mut::<3, 3>(ATTITUDE, ATTITUDE)
            .copy_from(&(eye - skew(gyro) * dt));
        f.fixed_view_mut::<3, 3>(ATTITUDE, GYRO_BIAS)
            .copy_from(&(-eye * dt));

        f
    }

    /// Discrete process noise for one step
    fn process_noise(&self, dt: f64) -> DMatrix<f64> {
        let mut q = DMatrix::zeros(CORE_ERROR_STATE_DIM, CORE_ERROR_STATE_DIM);
        let blocks = [
            (VELOCITY, self.noise.accel_noise),
            (ATTITUDE, self.noise.gyro_noise),
            (GYRO_BIAS, self.noise.gyro_bias_walk),
            (ACCEL_BIAS, self.noise.accel_bias_walk),
        ];
        for (offset, density) in blocks {
            for i in offset..offset + 3 {
                q[(i, i)] = density * density * dt;
            }
        }
        q
    }
}

impl StatePropagator for ImuPropagator {
    fn propagate(
        &self,
        prior: &StateSnapshot,
        input: Option<&MeasurementPayload>,
        dt: f64,
    ) -> Result<StateSnapshot, FusionError> {
        if prior.dim() != CORE_ERROR_STATE_DIM {
            return Err(FusionError::dimension_mismatch(
                format!("{} covariance", self.sensor),
                CORE_ERROR_STATE_DIM,
                prior.dim(),
            ));
        }

        let core = &prior.core;
        let reading = match input {
            Some(payload) => *payload.as_imu().ok_or(FusionError::PayloadMismatch {
                sensor: self.sensor.to_string(),
                expected: "imu",
                actual: payload.shape_name(),
            })?,
            None => ImuMeasurement::new(core.linear_acceleration, core.angular_velocity),
        };

        let gyro_prev = core.angular_velocity - core.gyro_bias;
        let gyro_now = reading.angular_velocity - core.gyro_bias;
        let acc_prev = core.linear_acceleration - core.accel_bias;
        let acc_now = reading.linear_acceleration - core.accel_bias;
        let gyro_mean = (gyro_prev + gyro_now) * 0.5;
        let acc_mean = (acc_prev + acc_now) * 0.5;

        let omega = omega_matrix(&gyro_mean) * (0.5 * dt);
        let orientation = quaternion_from_wxyz(
            &(matrix_exponential(&omega, self.matexp_order) * quaternion_to_wxyz(&core.orientation)),
        );

        let r_prev = core.orientation.to_rotation_matrix().into_inner();
        let r_now = orientation.to_rotation_matrix().into_inner();
        let acc_world = (r_prev * acc_prev + r_now * acc_now) * 0.5 + self.gravity;

        let mut next = prior.clone();
        next.core.position = core.position + core.velocity * dt + acc_world * (0.5 * dt * dt);
        next.core.velocity = core.velocity + acc_world * dt;
        next.core.orientation = orientation;
        next.core.angular_velocity = reading.angular_velocity;
        next.core.linear_acceleration = reading.linear_acceleration;

        let f = self.transition(&r_prev, &acc_mean, &gyro_mean, dt);
        let covariance = &f * &prior.covariance * f.transpose() + self.process_noise(dt);
        next.covariance = enforce_symmetry(&covariance);

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use contracts::{CoreState, PositionMeasurement};
    use nalgebra::UnitQuaternion;

    fn config() -> CoreConfig {
        CoreConfig {
            propagation_sensor: "imu".into(),
            gravity: 9.81,
            matexp_order: 4,
            reject_invalid_updates: false,
            imu_noise: ImuNoiseConfig::default(),
        }
    }

    fn at_rest() -> StateSnapshot {
        let core = CoreState {
            linear_acceleration: Vector3::new(0.0, 0.0, 9.81),
            ..CoreState::default()
        };
        StateSnapshot::new(
            core,
            DMatrix::identity(CORE_ERROR_STATE_DIM, CORE_ERROR_STATE_DIM) * 0.01,
        )
    }

    fn imu(acc: [f64; 3], gyro: [f64; 3]) -> MeasurementPayload {
        ImuMeasurement::new(Vector3::from(acc), Vector3::from(gyro)).into()
    }

    #[test]
    fn test_static_imu_stays_put() {
        let model = ImuPropagator::new("imu", &config());
        let next = model
            .propagate(&at_rest(), Some(&imu([0.0, 0.0, 9.81], [0.0; 3])), 0.1)
            .unwrap();

        assert_relative_eq!(next.core.position, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(next.core.velocity, Vector3::zeros(), epsilon = 1e-12);
        assert!(next.covariance[(3, 3)] > 0.01);
        assert_eq!(next.covariance, next.covariance.transpose());
    }

    #[test]
    fn test_constant_rotation_rate() {
        let model = ImuPropagator::new("imu", &config());
        let mut state = at_rest();
        state.core.angular_velocity = Vector3::new(0.0, 0.0, 0.5);
        let next = model
            .propagate(&state, Some(&imu([0.0, 0.0, 9.81], [0.0, 0.0, 0.5])), 0.2)
            .unwrap();

        let expected = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.1);
        assert!(next.core.orientation.angle_to(&expected) < 1e-6);
    }

    #[test]
    fn test_holds_last_reading_without_input() {
        let model = ImuPropagator::new("imu", &config());
        let mut state = at_rest();
        state.core.linear_acceleration = Vector3::new(1.0, 0.0, 9.81);
        let next = model.propagate(&state, None, 1.0).unwrap();

        assert_relative_eq!(next.core.velocity.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(next.core.position.x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_wrong_payload_and_dimension() {
        let model = ImuPropagator::new("imu", &config());
        let position: MeasurementPayload = PositionMeasurement::new(Vector3::zeros()).into();
        assert!(matches!(
            model.propagate(&at_rest(), Some(&position), 0.1),
            Err(FusionError::PayloadMismatch { .. })
        ));

        let small = StateSnapshot::new(CoreState::default(), DMatrix::identity(3, 3));
        assert!(matches!(
            model.propagate(&small, None, 0.1),
            Err(FusionError::DimensionMismatch { expected: 15, actual: 3, .. })
        ));
    }
}

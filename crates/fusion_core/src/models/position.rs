//! Direct position update, `H = [I₃ 0]`.

use contracts::error_state::{ACCEL_BIAS, ATTITUDE, GYRO_BIAS, POSITION, VELOCITY};
use contracts::{
    CovarianceConfig, FusionError, MeasurementPayload, MeasurementUpdater, SensorId,
    StateSnapshot, UpdateOutcome, CORE_ERROR_STATE_DIM,
};
use nalgebra::{DMatrix, Matrix3, Vector3};
use numeric_kernel::{apply_small_angle_correction, check_covariance_validity_with, enforce_symmetry};

/// Position fix update model with a Joseph-form covariance update
#[derive(Debug, Clone)]
pub struct PositionUpdater {
    sensor: SensorId,
    noise: Matrix3<f64>,
    tolerances: CovarianceConfig,
}

impl PositionUpdater {
    /// `noise_std` is the per-axis measurement standard deviation (m)
    pub fn new(sensor: impl Into<SensorId>, noise_std: [f64; 3], tolerances: CovarianceConfig) -> Self {
        let variance = Vector3::from(noise_std).map(|s| s * s);
        Self {
            sensor: sensor.into(),
            noise: Matrix3::from_diagonal(&variance),
            tolerances,
        }
    }
}

impl MeasurementUpdater for PositionUpdater {
    fn update(
        &self,
        prior: &StateSnapshot,
        measurement: &MeasurementPayload,
    ) -> Result<UpdateOutcome, FusionError> {
        let z = measurement
            .as_position()
            .ok_or(FusionError::PayloadMismatch {
                sensor: self.sensor.to_string(),
                expected: "position",
                actual: measurement.shape_name(),
            })?
            .position;

        let dim = prior.dim();
        if dim != CORE_ERROR_STATE_DIM {
            return Err(FusionError::dimension_mismatch(
                format!("{} covariance", self.sensor),
                CORE_ERROR_STATE_DIM,
                dim,
            ));
        }

        let p = &prior.covariance;
        let residual = z - prior.core.position;

        let innovation = p.fixed_view::<3, 3>(POSITION, POSITION) + self.noise;
        let innovation_inv = innovation.try_inverse().ok_or_else(|| {
            FusionError::collaborator(self.sensor.as_str(), "innovation covariance is singular")
        })?;
        let gain = p.fixed_columns::<3>(POSITION) * innovation_inv;
        let dx = &gain * residual;

        let mut next = prior.clone();
        let core = &mut next.core;
        core.position += dx.fixed_rows::<3>(POSITION);
        core.velocity += dx.fixed_rows::<3>(VELOCITY);
        core.orientation = apply_small_angle_correction(
            &core.orientation,
            &dx.fixed_rows::<3>(ATTITUDE).into_owned(),
        );
        core.gyro_bias += dx.fixed_rows::<3>(GYRO_BIAS);
        core.accel_bias += dx.fixed_rows::<3>(ACCEL_BIAS);

        // Joseph form: (I - KH) P (I - KH)ᵀ + K R Kᵀ
        let mut i_kh = DMatrix::identity(dim, dim);
        {
            let mut block = i_kh.fixed_columns_mut::<3>(POSITION);
            block -= &gain;
        }
        let covariance =
            &i_kh * p * i_kh.transpose() + &gain * self.noise * gain.transpose();
        next.covariance = enforce_symmetry(&covariance);

        let label = format!("{} update", self.sensor);
        let report = check_covariance_validity_with(
            &next.covariance,
            &label,
            self.tolerances.check_condition,
            &self.tolerances,
        );

        Ok(UpdateOutcome {
            snapshot: next,
            valid: report.is_valid(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use contracts::{CoreState, ImuMeasurement};

    fn prior(variance: f64) -> StateSnapshot {
        StateSnapshot::new(
            CoreState::default(),
            DMatrix::identity(CORE_ERROR_STATE_DIM, CORE_ERROR_STATE_DIM) * variance,
        )
    }

    fn fix(x: f64, y: f64, z: f64) -> MeasurementPayload {
        contracts::PositionMeasurement::new(Vector3::new(x, y, z)).into()
    }

    #[test]
    fn test_equal_weights_split_the_difference() {
        let updater = PositionUpdater::new("gps", [1.0; 3], CovarianceConfig::default());
        let outcome = updater.update(&prior(1.0), &fix(2.0, -2.0, 4.0)).unwrap();

        assert!(outcome.valid);
        assert_relative_eq!(
            outcome.snapshot.core.position,
            Vector3::new(1.0, -1.0, 2.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(outcome.snapshot.covariance[(0, 0)], 0.5, epsilon = 1e-12);
        // uncorrelated blocks are untouched
        assert_relative_eq!(outcome.snapshot.covariance[(3, 3)], 1.0, epsilon = 1e-12);
        assert_eq!(outcome.snapshot.core.orientation, CoreState::default().orientation);
    }

    #[test]
    fn test_correlation_moves_velocity() {
        let updater = PositionUpdater::new("gps", [0.1; 3], CovarianceConfig::default());
        let mut prior = prior(1.0);
        prior.covariance[(0, 3)] = 0.5;
        prior.covariance[(3, 0)] = 0.5;

        let outcome = updater.update(&prior, &fix(1.0, 0.0, 0.0)).unwrap();
        assert!(outcome.snapshot.core.velocity.x > 0.0);
        assert!(outcome.snapshot.covariance[(3, 3)] < 1.0);
    }

    #[test]
    fn test_rejects_wrong_payload() {
        let updater = PositionUpdater::new("gps", [1.0; 3], CovarianceConfig::default());
        let imu: MeasurementPayload =
            ImuMeasurement::new(Vector3::zeros(), Vector3::zeros()).into();
        assert!(matches!(
            updater.update(&prior(1.0), &imu),
            Err(FusionError::PayloadMismatch { expected: "position", .. })
        ));
    }

    #[test]
    fn test_invalid_prior_flags_outcome() {
        let updater = PositionUpdater::new("gps", [1.0; 3], CovarianceConfig::default());
        let mut prior = prior(1.0);
        prior.covariance[(14, 14)] = -1.0;

        let outcome = updater.update(&prior, &fix(0.0, 0.0, 0.0)).unwrap();
        assert!(!outcome.valid);
    }
}

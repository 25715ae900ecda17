//! Quaternion helpers: small-angle perturbations, averaging and
//! roll/pitch/yaw extraction.

use contracts::FusionError;
use nalgebra::{Matrix3, Matrix4, Quaternion, SymmetricEigen, UnitQuaternion, Vector3, Vector4};

/// Below this `sqrt(R00² + R10²)` the rotation is treated as gimbal locked
const GIMBAL_LOCK_EPS: f64 = 1e-9;

/// Quaternion coordinates in `[w, x, y, z]` order
pub fn quaternion_to_wxyz(q: &UnitQuaternion<f64>) -> Vector4<f64> {
    Vector4::new(q.w, q.i, q.j, q.k)
}

/// Unit quaternion from `[w, x, y, z]` coordinates (normalized)
pub fn quaternion_from_wxyz(v: &Vector4<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(v[0], v[1], v[2], v[3]))
}

/// First-order quaternion for the rotation vector `delta_theta`.
///
/// Only meaningful for small angles. Large inputs fall back to the
/// normalized `(1, δθ/2)` form so the result is always a unit quaternion.
pub fn quaternion_from_small_angle(delta_theta: &Vector3<f64>) -> UnitQuaternion<f64> {
    let half = delta_theta * 0.5;
    let q_sq = half.norm_squared();

    let q = if q_sq < 1.0 {
        Quaternion::new((1.0 - q_sq).sqrt(), half.x, half.y, half.z)
    } else {
        let w = 1.0 / (1.0 + q_sq).sqrt();
        Quaternion::new(w, half.x * w, half.y * w, half.z * w)
    };

    UnitQuaternion::new_normalize(q)
}

/// `prior ⊗ δq(correction)`, renormalized
pub fn apply_small_angle_correction(
    prior: &UnitQuaternion<f64>,
    correction: &Vector3<f64>,
) -> UnitQuaternion<f64> {
    let mut corrected = prior * quaternion_from_small_angle(correction);
    corrected.renormalize();
    corrected
}

/// `[roll, pitch, yaw]` of `R = Rz(yaw) · Ry(pitch) · Rx(roll)`.
///
/// At gimbal lock (pitch = ±90°) yaw is fixed to zero and the whole remaining
/// rotation is reported as roll.
pub fn euler_from_rotation(r: &Matrix3<f64>) -> Vector3<f64> {
    let cos_pitch = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();
    let pitch = (-r[(2, 0)]).atan2(cos_pitch);

    if cos_pitch < GIMBAL_LOCK_EPS {
        let roll = (-r[(2, 0)] * r[(0, 1)]).atan2(r[(1, 1)]);
        return Vector3::new(roll, pitch, 0.0);
    }

    let roll = r[(2, 1)].atan2(r[(2, 2)]);
    let yaw = r[(1, 0)].atan2(r[(0, 0)]);
    Vector3::new(roll, pitch, yaw)
}

/// Unweighted quaternion average (Markley et al., 2007).
///
/// Eigenvector of the largest eigenvalue of `Σ q qᵀ`, sign-aligned with the
/// first input so that the antipodal ambiguity resolves deterministically.
pub fn average_quaternions(
    quats: &[UnitQuaternion<f64>],
) -> Result<UnitQuaternion<f64>, FusionError> {
    let first = quats.first().ok_or_else(|| FusionError::EmptyInput {
        label: "average_quaternions".to_string(),
    })?;

    if quats.len() == 1 {
        return Ok(*first);
    }

    let accumulated = quats
        .iter()
        .fold(Matrix4::<f64>::zeros(), |acc, q| acc + q.coords * q.coords.transpose());

    let eigen = SymmetricEigen::new(accumulated);
    let dominant = eigen.eigenvalues.imax();
    let mut average = eigen.eigenvectors.column(dominant).into_owned();

    if average.dot(&first.coords) < 0.0 {
        average = -average;
    }

    Ok(UnitQuaternion::from_quaternion(Quaternion::from_vector(
        average,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_zero_correction_is_identity() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let q = UnitQuaternion::from_euler_angles(
                rng.random_range(-3.0..3.0),
                rng.random_range(-1.5..1.5),
                rng.random_range(-3.0..3.0),
            );
            let corrected = apply_small_angle_correction(&q, &Vector3::zeros());
            assert_relative_eq!(corrected.coords, q.coords, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_small_angle_close_to_exact_rotation() {
        let dtheta = Vector3::new(1e-3, -2e-3, 5e-4);
        let approx = quaternion_from_small_angle(&dtheta);
        let exact = UnitQuaternion::from_scaled_axis(dtheta);
        assert_relative_eq!(approx.coords, exact.coords, epsilon = 1e-9);
        assert_relative_eq!(approx.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_large_angle_stays_unit() {
        let q = quaternion_from_small_angle(&Vector3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
        assert!(q.w > 0.0);
    }

    #[test]
    fn test_correction_rotates_in_body_frame() {
        let prior = UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2);
        let corrected = apply_small_angle_correction(&prior, &Vector3::new(0.0, 0.0, 0.01));
        assert_relative_eq!(corrected.euler_angles().2, FRAC_PI_2 + 0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_euler_round_trip() {
        let (roll, pitch, yaw) = (0.3, -0.4, 1.2);
        let r = UnitQuaternion::from_euler_angles(roll, pitch, yaw).to_rotation_matrix();
        let rpy = euler_from_rotation(r.matrix());
        assert_relative_eq!(rpy, Vector3::new(roll, pitch, yaw), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_gimbal_lock_is_finite() {
        for pitch in [FRAC_PI_2, -FRAC_PI_2] {
            let q = UnitQuaternion::from_euler_angles(0.25, pitch, 0.0);
            let rpy = euler_from_rotation(q.to_rotation_matrix().matrix());
            assert!(rpy.iter().all(|a| a.is_finite()));
            assert_eq!(rpy.z, 0.0);
            assert_relative_eq!(rpy.y, pitch, epsilon = 1e-6);

            let rebuilt = UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z);
            assert!(rebuilt.angle_to(&q) < 1e-6);
        }
    }

    #[test]
    fn test_average_single_is_identity() {
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        assert_eq!(average_quaternions(&[q]).unwrap(), q);
    }

    #[test]
    fn test_average_empty_is_error() {
        assert!(matches!(
            average_quaternions(&[]),
            Err(FusionError::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_average_symmetric_spread() {
        let base = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5);
        let quats = [
            base * UnitQuaternion::from_euler_angles(0.0, 0.0, 0.1),
            base * UnitQuaternion::from_euler_angles(0.0, 0.0, -0.1),
        ];
        let avg = average_quaternions(&quats).unwrap();
        assert_relative_eq!(avg.coords, base.coords, epsilon = 1e-9);
    }

    #[test]
    fn test_average_ignores_antipodal_sign() {
        let q = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.4);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
        let avg = average_quaternions(&[q, flipped, q]).unwrap();
        assert_relative_eq!(avg.coords, q.coords, epsilon = 1e-9);
    }

    #[test]
    fn test_wxyz_ordering() {
        let q = UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0);
        let v = quaternion_to_wxyz(&q);
        assert_eq!(v[0], q.w);
        assert_eq!(v[1], q.i);
        assert_relative_eq!(quaternion_from_wxyz(&v).coords, q.coords, epsilon = 1e-15);
    }
}

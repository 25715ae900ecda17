//! Rigid transform of IMU readings between two frames of the same body.
//!
//! `p_ab` and `q_ab` give frame B relative to frame A. For a rigid body the
//! angular rate is shared by both frames, only expressed differently, while
//! the specific force at B picks up the centripetal and (optionally) the
//! tangential lever-arm terms.

use contracts::ImuMeasurement;
use nalgebra::{UnitQuaternion, Vector3};

use crate::skew;

/// Transform `now` from frame A to frame B, ignoring angular acceleration.
pub fn transform_imu(
    now: &ImuMeasurement,
    p_ab: &Vector3<f64>,
    q_ab: &UnitQuaternion<f64>,
) -> ImuMeasurement {
    transform(now, &Vector3::zeros(), p_ab, q_ab)
}

/// Transform `now` from frame A to frame B, including the angular
/// acceleration estimated from `prev` over `dt` seconds.
///
/// A non-positive or non-finite `dt` drops the angular acceleration term.
pub fn transform_imu_with_history(
    prev: &ImuMeasurement,
    now: &ImuMeasurement,
    dt: f64,
    p_ab: &Vector3<f64>,
    q_ab: &UnitQuaternion<f64>,
) -> ImuMeasurement {
    let angular_acceleration = if dt.is_finite() && dt > 0.0 {
        (now.angular_velocity - prev.angular_velocity) / dt
    } else {
        Vector3::zeros()
    };

    transform(now, &angular_acceleration, p_ab, q_ab)
}

fn transform(
    now: &ImuMeasurement,
    angular_acceleration: &Vector3<f64>,
    p_ab: &Vector3<f64>,
    q_ab: &UnitQuaternion<f64>,
) -> ImuMeasurement {
    let r_ba = q_ab.to_rotation_matrix().transpose();
    let w_x = skew(&now.angular_velocity);

    let lever_arm = skew(angular_acceleration) * p_ab + w_x * w_x * p_ab;

    ImuMeasurement {
        linear_acceleration: r_ba * (now.linear_acceleration + lever_arm),
        angular_velocity: r_ba * now.angular_velocity,
    }
}

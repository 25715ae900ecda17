//! # Numeric Kernel
//!
//! Stateless geometry and linear-algebra operations used by propagation and
//! correction models:
//! - skew-symmetric and quaternion-kinematics operators, truncated matrix exponential
//! - small-angle quaternion construction and correction, quaternion averaging,
//!   roll/pitch/yaw extraction
//! - covariance validity checks and symmetrization
//! - rigid IMU frame transforms
//!
//! Every function is pure. The only side effect in this crate is the
//! `tracing::warn!` emitted when a covariance check fails.
//!
//! ## Quaternion ordering
//!
//! `nalgebra` stores quaternion coordinates as `[i, j, k, w]`. The kinematics
//! operators ([`omega_matrix`], [`matrix_exponential`]) work on `[w, x, y, z]`
//! vectors; convert with [`quaternion_to_wxyz`] / [`quaternion_from_wxyz`].

mod covariance;
mod imu_transform;
mod lie;
mod quaternion;
mod sampling;

pub use covariance::{
    check_covariance_validity, check_covariance_validity_with, enforce_symmetry,
    CovarianceFailure, CovarianceReport,
};
pub use imu_transform::{transform_imu, transform_imu_with_history};
pub use lie::{matrix_exponential, omega_matrix, skew};
pub use quaternion::{
    apply_small_angle_correction, average_quaternions, euler_from_rotation,
    quaternion_from_small_angle, quaternion_from_wxyz, quaternion_to_wxyz,
};
pub use sampling::every_nth;

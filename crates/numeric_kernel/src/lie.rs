//! Skew-symmetric operator, quaternion kinematics matrix and truncated
//! matrix exponential.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Skew-symmetric matrix `[v]×` such that `[v]× u = v × u`
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Quaternion kinematics operator `Ω(ω)` for right multiplication.
///
/// With `q` as `[w, x, y, z]`, `q̇ = ½ Ω(ω) q` equals `½ q ⊗ [0, ω]`.
pub fn omega_matrix(v: &Vector3<f64>) -> Matrix4<f64> {
    Matrix4::new(
        0.0, -v.x, -v.y, -v.z, //
        v.x, 0.0, v.z, -v.y, //
        v.y, -v.z, 0.0, v.x, //
        v.z, v.y, -v.x, 0.0,
    )
}

/// Matrix exponential cut off after the `order`-th Taylor term.
///
/// `I + Σ_{k=1}^{order} A^k / k!`. A non-positive `order` yields the identity.
pub fn matrix_exponential(a: &Matrix4<f64>, order: i32) -> Matrix4<f64> {
    let mut result = Matrix4::identity();
    let mut power = Matrix4::identity();
    let mut factorial = 1.0_f64;

    for k in 1..=order.max(0) {
        power *= a;
        factorial *= f64::from(k);
        result += power / factorial;
    }

    result
}

//! Covariance validity checks and symmetrization.
//!
//! An invalid covariance is a recoverable diagnostic: the check reports which
//! property failed and logs a warning tagged with the caller's label, then
//! returns. Whether to clamp, reset or halt is the caller's decision.

use std::fmt;

use contracts::CovarianceConfig;
use nalgebra::DMatrix;

/// The first property a covariance matrix failed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CovarianceFailure {
    /// Matrix is not square
    NotSquare { rows: usize, cols: usize },
    /// Matrix contains NaN or infinite values
    NonFinite,
    /// Largest `|P - Pᵀ|` exceeds the symmetry tolerance
    Asymmetric { max_deviation: f64 },
    /// Smallest eigenvalue is negative beyond the eigen tolerance
    NotPositiveSemiDefinite { min_eigenvalue: f64 },
    /// Condition number exceeds the configured limit
    IllConditioned { condition: f64 },
}

impl fmt::Display for CovarianceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { rows, cols } => write!(f, "not square ({rows}x{cols})"),
            Self::NonFinite => write!(f, "contains non-finite values"),
            Self::Asymmetric { max_deviation } => {
                write!(f, "not symmetric (max deviation {max_deviation:e})")
            }
            Self::NotPositiveSemiDefinite { min_eigenvalue } => {
                write!(f, "not positive semi-definite (min eigenvalue {min_eigenvalue:e})")
            }
            Self::IllConditioned { condition } => {
                write!(f, "ill-conditioned (condition number {condition:e})")
            }
        }
    }
}

/// Result of a covariance check
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceReport {
    /// Label supplied by the caller
    pub label: String,
    /// First failed check, `None` when valid
    pub failure: Option<CovarianceFailure>,
}

impl CovarianceReport {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Check a covariance with the default tolerances.
pub fn check_covariance_validity(
    cov: &DMatrix<f64>,
    label: &str,
    check_condition: bool,
) -> CovarianceReport {
    check_covariance_validity_with(cov, label, check_condition, &CovarianceConfig::default())
}

/// Check squareness, finiteness, symmetry, positive semi-definiteness and
/// (optionally) the condition number, stopping at the first failure.
///
/// Symmetry and eigenvalue tolerances scale with `max(1, |largest entry|)`.
pub fn check_covariance_validity_with(
    cov: &DMatrix<f64>,
    label: &str,
    check_condition: bool,
    tolerances: &CovarianceConfig,
) -> CovarianceReport {
    let failure = first_failure(cov, check_condition, tolerances);

    if let Some(failure) = &failure {
        tracing::warn!(
            label = %label,
            dim = cov.nrows(),
            check = %failure,
            "Covariance check failed"
        );
    }

    CovarianceReport {
        label: label.to_string(),
        failure,
    }
}

fn first_failure(
    cov: &DMatrix<f64>,
    check_condition: bool,
    tolerances: &CovarianceConfig,
) -> Option<CovarianceFailure> {
    if !cov.is_square() {
        return Some(CovarianceFailure::NotSquare {
            rows: cov.nrows(),
            cols: cov.ncols(),
        });
    }
    if cov.is_empty() {
        return None;
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Some(CovarianceFailure::NonFinite);
    }

    let scale = cov.amax().max(1.0);
    let max_deviation = (cov - cov.transpose()).amax();
    if max_deviation > tolerances.symmetry_tolerance * scale {
        return Some(CovarianceFailure::Asymmetric { max_deviation });
    }

    let eigenvalues = cov.symmetric_eigenvalues();
    let min_eigenvalue = eigenvalues.min();
    let max_eigenvalue = eigenvalues.max();
    let eigen_scale = eigenvalues.amax().max(1.0);
    if min_eigenvalue < -tolerances.eigen_tolerance * eigen_scale {
        return Some(CovarianceFailure::NotPositiveSemiDefinite { min_eigenvalue });
    }

    if check_condition {
        let condition = if min_eigenvalue > 0.0 {
            max_eigenvalue / min_eigenvalue
        } else {
            f64::INFINITY
        };
        if condition > tolerances.condition_limit {
            return Some(CovarianceFailure::IllConditioned { condition });
        }
    }

    None
}

/// `(M + Mᵀ) / 2`
pub fn enforce_symmetry(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_valid() {
        let report = check_covariance_validity(&DMatrix::identity(3, 3), "identity", true);
        assert!(report.is_valid());
        assert_eq!(report.label, "identity");
    }

    #[test]
    fn test_asymmetric_detected() {
        let mut cov = DMatrix::identity(3, 3);
        cov[(0, 1)] = 0.5;
        let report = check_covariance_validity(&cov, "p", false);
        assert!(matches!(
            report.failure,
            Some(CovarianceFailure::Asymmetric { .. })
        ));
    }

    #[test]
    fn test_negative_definite_detected() {
        let cov = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, -0.5, 2.0]));
        let report = check_covariance_validity(&cov, "p", false);
        assert!(matches!(
            report.failure,
            Some(CovarianceFailure::NotPositiveSemiDefinite { .. })
        ));
    }

    #[test]
    fn test_non_finite_detected() {
        let mut cov = DMatrix::identity(2, 2);
        cov[(1, 1)] = f64::NAN;
        assert_eq!(
            check_covariance_validity(&cov, "p", false).failure,
            Some(CovarianceFailure::NonFinite)
        );
    }

    #[test]
    fn test_not_square_detected() {
        let cov = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            check_covariance_validity(&cov, "p", false).failure,
            Some(CovarianceFailure::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_condition_only_when_requested() {
        let cov = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 1e-14]));
        assert!(check_covariance_validity(&cov, "p", false).is_valid());
        assert!(matches!(
            check_covariance_validity(&cov, "p", true).failure,
            Some(CovarianceFailure::IllConditioned { .. })
        ));
    }

    #[test]
    fn test_custom_tolerances() {
        let mut cov = DMatrix::identity(2, 2);
        cov[(0, 1)] = 1e-6;
        let loose = CovarianceConfig {
            symmetry_tolerance: 1e-3,
            ..CovarianceConfig::default()
        };
        assert!(!check_covariance_validity(&cov, "p", false).is_valid());
        assert!(check_covariance_validity_with(&cov, "p", false, &loose).is_valid());
    }

    #[test]
    fn test_enforce_symmetry_idempotent() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.5]);
        let once = enforce_symmetry(&m);
        let twice = enforce_symmetry(&once);
        assert_eq!(once, twice);
        assert_eq!(once, once.transpose());
        assert_eq!(once[(0, 1)], 3.0);
    }
}

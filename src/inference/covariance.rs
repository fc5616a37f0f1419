//! inference::covariance — Gauss–Newton parameter covariance.
//!
//! Purpose
//! -------
//! Turn the residual Jacobian and residuals at a least-squares optimum into
//! an estimate of the parameter covariance,
//! `C = σ²·(JᵀJ)⁺` with `σ² = ‖r‖² / (m - n)`.
//!
//! Key behaviors
//! -------------
//! - Copy `JᵀJ` into a `nalgebra::DMatrix` (`fill_dmatrix`) and form the
//!   Moore–Penrose pseudoinverse from its symmetric eigendecomposition.
//! - Eigenvalues at or below `EIGEN_EPS · λ_max` are truncated, so weakly
//!   identified directions contribute nothing instead of blowing up.
//! - [`upper_triangle`] flattens a symmetric matrix row-major for storage
//!   in a single multi-channel output.
//!
//! Invariants & assumptions
//! ------------------------
//! - `jacobian` is `m × n` and finite; `residuals` has length `m`.
//! - Covariance is produced in the same coordinates as the Jacobian; the
//!   fitting layer maps it back to natural units.
//!
//! Conventions
//! -----------
//! - No explicit matrix inverse is formed.
//! - Errors are reported via [`OptResult<T>`].
//!
//! Testing notes
//! -------------
//! - Unit tests cover a linear regression with a closed-form covariance,
//!   rank-deficient Jacobians, the degrees-of-freedom guard and the
//!   upper-triangle layout.
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::{Jacobian, Residuals, validation::validate_jacobian},
    numerical_stability::transformations::EIGEN_EPS,
};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

/// covariance_from_jacobian — `σ²·(JᵀJ)⁺` at a least-squares optimum.
///
/// Parameters
/// ----------
/// - `jacobian`: `m × n` residual Jacobian at the optimum.
/// - `residuals`: length-`m` residuals at the optimum.
///
/// Returns
/// -------
/// `n × n` symmetric covariance estimate.
///
/// Errors
/// ------
/// - `OptError::InsufficientDegreesOfFreedom` when `m <= n`.
/// - `OptError::JacobianDimMismatch` / `InvalidJacobian` from validation.
pub fn covariance_from_jacobian(
    jacobian: &Jacobian, residuals: &Residuals,
) -> OptResult<Array2<f64>> {
    let (m, n) = jacobian.dim();
    validate_jacobian(jacobian, residuals.len(), n)?;
    if m <= n {
        return Err(OptError::InsufficientDegreesOfFreedom { n_residuals: m, n_params: n });
    }
    let sigma2 = residuals.dot(residuals) / (m - n) as f64;
    let jtj = jacobian.t().dot(jacobian);
    let mut jtj_nalg = DMatrix::<f64>::zeros(n, n);
    fill_dmatrix(&jtj, &mut jtj_nalg);
    let pinv = pseudo_inverse(jtj_nalg, n);
    Ok(pinv * sigma2)
}

/// Row-major upper triangle (including the diagonal) of a square matrix.
///
/// Length is `n·(n+1)/2`.
pub fn upper_triangle(matrix: &Array2<f64>) -> Array1<f64> {
    let n = matrix.nrows();
    let mut out = Vec::with_capacity(n * (n + 1) / 2);
    for i in 0..n {
        for j in i..n {
            out.push(matrix[[i, j]]);
        }
    }
    Array1::from(out)
}

// ---- Helper methods ----

/// Copy a symmetric `ndarray` matrix into a preallocated `DMatrix`.
fn fill_dmatrix(source: &Array2<f64>, target: &mut DMatrix<f64>) {
    let n = source.ncols();
    for j in 0..n {
        for i in j..n {
            let v = 0.5 * (source[[i, j]] + source[[j, i]]);
            target[(i, j)] = v;
            target[(j, i)] = v;
        }
    }
}

/// `Σ_{λ_k > EIGEN_EPS·λ_max} q_k q_kᵀ / λ_k`.
fn pseudo_inverse(matrix: DMatrix<f64>, n: usize) -> Array2<f64> {
    let eigen_decomp = matrix.symmetric_eigen();
    let q = eigen_decomp.eigenvectors;
    let eigenvals = eigen_decomp.eigenvalues;
    let lambda_max = eigenvals.iter().fold(0.0_f64, |acc, &l| acc.max(l));
    let threshold = EIGEN_EPS * lambda_max;
    let mut pinv = Array2::<f64>::zeros((n, n));
    if lambda_max <= 0.0 {
        return pinv;
    }
    for (k, &lambda) in eigenvals.iter().enumerate() {
        if lambda <= threshold {
            continue;
        }
        for i in 0..n {
            for j in 0..n {
                pinv[[i, j]] += q[(i, k)] * q[(j, k)] / lambda;
            }
        }
    }
    pinv
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Agreement with the closed-form OLS covariance σ²(XᵀX)⁻¹.
    // - Truncation of a rank-deficient direction.
    // - The degrees-of-freedom guard.
    // - Row-major upper-triangle layout.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the covariance matches σ²(XᵀX)⁻¹ for a diagonal design.
    //
    // Given
    // -----
    // - J with orthogonal columns of squared norms 4 and 1, m = 5, n = 2,
    //   residuals with ‖r‖² = 3.
    //
    // Expect
    // ------
    // - σ² = 1 and C = diag(1/4, 1).
    fn covariance_matches_closed_form_for_orthogonal_design() {
        // Arrange
        let jac = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let residuals = array![1.0, 1.0, 1.0, 0.0, 0.0];

        // Act
        let cov = covariance_from_jacobian(&jac, &residuals).expect("covariance");

        // Assert
        assert_relative_eq!(cov[[0, 0]], 0.25, max_relative = 1e-12);
        assert_relative_eq!(cov[[1, 1]], 1.0, max_relative = 1e-12);
        assert_relative_eq!(cov[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a rank-deficient Jacobian yields a finite pseudoinverse.
    //
    // Given
    // -----
    // - Two identical columns.
    //
    // Expect
    // ------
    // - All entries finite; the matrix is symmetric.
    fn covariance_is_finite_for_rank_deficient_jacobian() {
        // Arrange
        let jac = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let residuals = array![0.1, -0.2, 0.1];

        // Act
        let cov = covariance_from_jacobian(&jac, &residuals).expect("covariance");

        // Assert
        assert!(cov.iter().all(|v| v.is_finite()));
        assert_relative_eq!(cov[[0, 1]], cov[[1, 0]], epsilon = 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Check the guard against m <= n.
    //
    // Given
    // -----
    // - A 2×2 Jacobian.
    //
    // Expect
    // ------
    // - `InsufficientDegreesOfFreedom`.
    fn covariance_requires_more_residuals_than_parameters() {
        // Act
        let result = covariance_from_jacobian(&Array2::eye(2), &array![0.0, 0.0]);

        // Assert
        assert_eq!(
            result,
            Err(OptError::InsufficientDegreesOfFreedom { n_residuals: 2, n_params: 2 })
        );
    }

    #[test]
    // Purpose
    // -------
    // Verify the flattened layout of the upper triangle.
    //
    // Given
    // -----
    // - A 3×3 symmetric matrix.
    //
    // Expect
    // ------
    // - [a00, a01, a02, a11, a12, a22].
    fn upper_triangle_is_row_major() {
        // Arrange
        let m = array![[1.0, 2.0, 3.0], [2.0, 4.0, 5.0], [3.0, 5.0, 6.0]];

        // Act
        let flat = upper_triangle(&m);

        // Assert
        assert_eq!(flat, array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}

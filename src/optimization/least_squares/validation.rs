//! Validation helpers for bounded least squares.
//!
//! This module centralizes the consistency checks used across the solver
//! interface:
//!
//! - **Tolerance checks**: [`verify_tol_grad`], [`verify_tol_cost`].
//! - **Residuals and Jacobians**: [`validate_residuals`],
//!   [`validate_jacobian`] enforce shapes and finite entries.
//! - **Bounds**: [`validate_bounds`] checks lengths, ordering and that the
//!   starting point lies inside the box.
//! - **Outcomes**: [`validate_grad`], [`validate_theta_hat`],
//!   [`validate_value`].
//!
//! All helpers return domain-specific [`OptError`] variants.
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::types::{Grad, Jacobian, Residuals, Theta},
};

/// Validate the optional gradient tolerance.
///
/// # Errors
/// Returns [`OptError::InvalidTolGrad`] if the value is non-finite or ≤ 0.0.
pub fn verify_tol_grad(tol: Option<f64>) -> OptResult<()> {
    if let Some(tol) = tol {
        if !tol.is_finite() {
            return Err(OptError::InvalidTolGrad { tol, reason: "Tolerance must be finite." });
        }
        if tol <= 0.0 {
            return Err(OptError::InvalidTolGrad { tol, reason: "Tolerance must be positive." });
        }
    }
    Ok(())
}

/// Validate the optional cost-change tolerance.
///
/// # Errors
/// Returns [`OptError::InvalidTolCost`] if the value is non-finite or ≤ 0.0.
pub fn verify_tol_cost(tol: Option<f64>) -> OptResult<()> {
    if let Some(tol) = tol {
        if !tol.is_finite() {
            return Err(OptError::InvalidTolCost { tol, reason: "Tolerance must be finite." });
        }
        if tol <= 0.0 {
            return Err(OptError::InvalidTolCost { tol, reason: "Tolerance must be positive." });
        }
    }
    Ok(())
}

/// Validate a residual vector against its expected length and finiteness.
///
/// # Errors
/// - [`OptError::ResidualDimMismatch`] if the length differs from `dim`.
/// - [`OptError::NonFiniteResidual`] for the first `NaN`/`±∞` entry.
pub fn validate_residuals(residuals: &Residuals, dim: usize) -> OptResult<()> {
    if residuals.len() != dim {
        return Err(OptError::ResidualDimMismatch { expected: dim, found: residuals.len() });
    }
    for (index, &value) in residuals.iter().enumerate() {
        if !value.is_finite() {
            return Err(OptError::NonFiniteResidual { index, value });
        }
    }
    Ok(())
}

/// Validate the shape and entries of a residual Jacobian.
///
/// # Errors
/// - [`OptError::JacobianDimMismatch`] if the shape is not `rows × cols`.
/// - [`OptError::InvalidJacobian`] with the first non-finite entry.
pub fn validate_jacobian(jacobian: &Jacobian, rows: usize, cols: usize) -> OptResult<()> {
    if jacobian.nrows() != rows || jacobian.ncols() != cols {
        return Err(OptError::JacobianDimMismatch {
            expected: (rows, cols),
            found: (jacobian.nrows(), jacobian.ncols()),
        });
    }
    for ((row, col), &value) in jacobian.indexed_iter() {
        if !value.is_finite() {
            return Err(OptError::InvalidJacobian { row, col, value });
        }
    }
    Ok(())
}

/// Validate the box and the starting point.
///
/// # Checks
/// 1. `lo`, `hi` and `x0` have the same length.
/// 2. Every bound is finite and `lo[i] <= hi[i]`.
/// 3. `lo[i] <= x0[i] <= hi[i]`.
pub fn validate_bounds(lo: &Theta, hi: &Theta, x0: &Theta) -> OptResult<()> {
    let n = x0.len();
    if lo.len() != n {
        return Err(OptError::BoundsLengthMismatch { expected: n, found: lo.len() });
    }
    if hi.len() != n {
        return Err(OptError::BoundsLengthMismatch { expected: n, found: hi.len() });
    }
    for index in 0..n {
        let (l, h, v) = (lo[index], hi[index], x0[index]);
        if !l.is_finite() || !h.is_finite() || l > h {
            return Err(OptError::InvalidBounds { index, lo: l, hi: h });
        }
        if !(l..=h).contains(&v) {
            return Err(OptError::InitialOutsideBounds { index, value: v, lo: l, hi: h });
        }
    }
    Ok(())
}

/// Validate a gradient vector against dimension and finiteness.
///
/// # Errors
/// - [`OptError::GradientDimMismatch`] if length does not match `dim`.
/// - [`OptError::InvalidGradient`] for the first offending element.
pub fn validate_grad(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    for (index, &value) in grad.iter().enumerate() {
        if !value.is_finite() {
            return Err(OptError::InvalidGradient {
                index,
                value,
                reason: "Gradient elements must be finite.",
            });
        }
    }
    Ok(())
}

/// Validate and unwrap an estimated parameter vector.
///
/// # Errors
/// - [`OptError::MissingThetaHat`] if no vector was provided.
/// - [`OptError::InvalidThetaHat`] if any element is non-finite.
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    match theta_hat {
        Some(t) => {
            for (index, &value) in t.iter().enumerate() {
                if !value.is_finite() {
                    return Err(OptError::InvalidThetaHat {
                        index,
                        value,
                        reason: "Parameter estimates must be finite.",
                    });
                }
            }
            Ok(t)
        }
        None => Err(OptError::MissingThetaHat),
    }
}

/// Validate that a scalar cost is finite.
///
/// # Errors
/// Returns [`OptError::NonFiniteCost`] if the value is `NaN` or infinite.
pub fn validate_value(value: f64) -> OptResult<()> {
    if !value.is_finite() {
        return Err(OptError::NonFiniteCost { value });
    }
    Ok(())
}

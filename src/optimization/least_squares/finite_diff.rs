//! least_squares::finite_diff — robust finite-difference residual Jacobians.
//!
//! Purpose
//! -------
//! Provide finite-difference Jacobians `∂r/∂x` for residual models that do
//! not supply an analytic one, with error capture, central → forward
//! fallback, and post-hoc validation.
//!
//! Key behaviors
//! -------------
//! - [`jacobian_or_fd`] asks the problem for an analytic Jacobian and falls
//!   back to [`compute_jacobian`] on `JacobianNotImplemented`.
//! - [`compute_jacobian`] builds the matrix column by column through
//!   `finitediff`'s Jacobian–vector products with unit directions, so the
//!   orientation is always `n_residuals × n_params`.
//! - Residual errors raised inside the differencing closure are captured in
//!   a `RefCell` and re-surfaced after the sweep; the closure itself
//!   returns a `NaN` vector.
//!
//! Invariants & assumptions
//! ------------------------
//! - Parameters are in scaled, O(1) coordinates, so `finitediff`'s absolute
//!   step sizes are appropriate.
//! - Central differences may step slightly outside the box; residual models
//!   must tolerate that or report an error, which triggers the forward
//!   fallback.
//!
//! Testing notes
//! -------------
//! - Unit tests compare FD Jacobians against analytic ones for a small
//!   exponential model and check error propagation from a failing closure.
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::{
        traits::LeastSquaresProblem,
        types::{Jacobian, Residuals, Theta},
        validation::validate_jacobian,
    },
};
use finitediff::FiniteDiff;
use ndarray::Array1;
use std::cell::RefCell;

/// Analytic Jacobian when the problem provides one, finite differences otherwise.
///
/// # Errors
/// - Propagates analytic-Jacobian errors other than `JacobianNotImplemented`.
/// - Propagates validation failures and residual errors from the FD sweep.
pub fn jacobian_or_fd<P: LeastSquaresProblem + ?Sized>(
    problem: &P, x: &Theta, n_residuals: usize,
) -> OptResult<Jacobian> {
    match problem.jacobian(x) {
        Ok(jac) => {
            validate_jacobian(&jac, n_residuals, x.len())?;
            Ok(jac)
        }
        Err(OptError::JacobianNotImplemented) => compute_jacobian(problem, x, n_residuals),
        Err(e) => Err(e),
    }
}

/// compute_jacobian — finite-difference residual Jacobian with fallback.
///
/// Behavior
/// --------
/// - Try *central* differences first.
/// - If a residual evaluation failed, or the result fails validation, retry
///   once with *forward* differences.
/// - If the forward sweep also fails, return the captured residual error or
///   the validation error.
///
/// # Errors
/// - Any `OptError` raised by `problem.residuals` during the forward sweep.
/// - `JacobianDimMismatch` / `InvalidJacobian` from validation.
pub fn compute_jacobian<P: LeastSquaresProblem + ?Sized>(
    problem: &P, x: &Theta, n_residuals: usize,
) -> OptResult<Jacobian> {
    let n_params = x.len();
    let closure_err: RefCell<Option<OptError>> = RefCell::new(None);
    let resid_fn = |x: &Theta| -> Residuals {
        match problem.residuals(x) {
            Ok(r) if r.len() == n_residuals => r,
            Ok(r) => {
                record_error(
                    &closure_err,
                    OptError::ResidualDimMismatch { expected: n_residuals, found: r.len() },
                );
                Array1::from_elem(n_residuals, f64::NAN)
            }
            Err(e) => {
                record_error(&closure_err, e);
                Array1::from_elem(n_residuals, f64::NAN)
            }
        }
    };

    let central = sweep_columns(x, &resid_fn, n_residuals, true);
    if closure_err.borrow().is_none() && validate_jacobian(&central, n_residuals, n_params).is_ok()
    {
        return Ok(central);
    }

    closure_err.replace(None);
    let forward = sweep_columns(x, &resid_fn, n_residuals, false);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_jacobian(&forward, n_residuals, n_params)?;
    Ok(forward)
}

// ---- Helper Methods ----

fn record_error(slot: &RefCell<Option<OptError>>, err: OptError) {
    let mut slot = slot.borrow_mut();
    if slot.is_none() {
        *slot = Some(err);
    }
}

/// Fill the Jacobian one column at a time using unit-direction products.
fn sweep_columns<F: Fn(&Theta) -> Residuals>(
    x: &Theta, resid_fn: &F, n_residuals: usize, central: bool,
) -> Jacobian {
    let n_params = x.len();
    let mut jac = Jacobian::zeros((n_residuals, n_params));
    let mut direction = Theta::zeros(n_params);
    for j in 0..n_params {
        direction[j] = 1.0;
        let column = if central {
            x.central_jacobian_vec_prod(resid_fn, &direction)
        } else {
            x.forward_jacobian_vec_prod(resid_fn, &direction)
        };
        if column.len() == n_residuals {
            jac.column_mut(j).assign(&column);
        } else {
            jac.column_mut(j).fill(f64::NAN);
        }
        direction[j] = 0.0;
    }
    jac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Agreement of FD Jacobians with an analytic Jacobian.
    // - Preference for the analytic Jacobian in `jacobian_or_fd`.
    // - Propagation of residual errors raised inside the FD closure.
    // -------------------------------------------------------------------------

    /// r_i(x) = y_i - x0·exp(-t_i·x1)
    struct ExpDecay {
        t: Array1<f64>,
        y: Array1<f64>,
        lo: Theta,
        hi: Theta,
        analytic: bool,
    }

    impl ExpDecay {
        fn new(analytic: bool) -> Self {
            Self {
                t: array![0.1, 0.5, 1.0, 2.0],
                y: array![0.9, 0.6, 0.4, 0.1],
                lo: array![0.0, 0.0],
                hi: array![10.0, 10.0],
                analytic,
            }
        }
    }

    impl LeastSquaresProblem for ExpDecay {
        fn residuals(&self, x: &Theta) -> OptResult<Residuals> {
            Ok(&self.y - &self.t.mapv(|t| x[0] * (-t * x[1]).exp()))
        }

        fn bounds(&self) -> (&Theta, &Theta) {
            (&self.lo, &self.hi)
        }

        fn jacobian(&self, x: &Theta) -> OptResult<Jacobian> {
            if !self.analytic {
                return Err(OptError::JacobianNotImplemented);
            }
            let mut jac = Array2::zeros((self.t.len(), 2));
            for (i, &t) in self.t.iter().enumerate() {
                let e = (-t * x[1]).exp();
                jac[[i, 0]] = -e;
                jac[[i, 1]] = x[0] * t * e;
            }
            Ok(jac)
        }
    }

    struct AlwaysFails {
        lo: Theta,
        hi: Theta,
    }

    impl LeastSquaresProblem for AlwaysFails {
        fn residuals(&self, _x: &Theta) -> OptResult<Residuals> {
            Err(OptError::NonFiniteResidual { index: 0, value: f64::NAN })
        }

        fn bounds(&self) -> (&Theta, &Theta) {
            (&self.lo, &self.hi)
        }
    }

    #[test]
    // Purpose
    // -------
    // Verify the FD Jacobian matches the analytic one with the expected
    // orientation (rows = residuals, cols = parameters).
    //
    // Given
    // -----
    // - Exponential decay with 4 samples and x = [1.2, 0.8].
    //
    // Expect
    // ------
    // - Shape (4, 2) and entry-wise agreement to 1e-6.
    fn compute_jacobian_matches_analytic_for_exponential() {
        // Arrange
        let analytic = ExpDecay::new(true);
        let fd_only = ExpDecay::new(false);
        let x = array![1.2, 0.8];

        // Act
        let expected = analytic.jacobian(&x).expect("analytic Jacobian");
        let fd = compute_jacobian(&fd_only, &x, 4).expect("FD Jacobian");

        // Assert
        assert_eq!(fd.dim(), (4, 2));
        for (a, b) in fd.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure `jacobian_or_fd` falls back to FD only when the analytic
    // Jacobian is not implemented.
    //
    // Given
    // -----
    // - The same model with and without an analytic Jacobian.
    //
    // Expect
    // ------
    // - Both paths succeed and agree.
    fn jacobian_or_fd_falls_back_when_not_implemented() {
        // Arrange
        let x = array![0.7, 1.5];

        // Act
        let a = jacobian_or_fd(&ExpDecay::new(true), &x, 4).expect("analytic path");
        let b = jacobian_or_fd(&ExpDecay::new(false), &x, 4).expect("fd path");

        // Assert
        for (u, v) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*u, *v, epsilon = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Check that residual errors raised inside the FD closure surface as
    // the original error.
    //
    // Given
    // -----
    // - A problem whose residuals always fail.
    //
    // Expect
    // ------
    // - `compute_jacobian` returns the `NonFiniteResidual` error.
    fn compute_jacobian_propagates_closure_errors() {
        // Arrange
        let problem = AlwaysFails { lo: array![0.0], hi: array![1.0] };

        // Act
        let result = compute_jacobian(&problem, &array![0.5], 3);

        // Assert
        assert!(matches!(result, Err(OptError::NonFiniteResidual { .. })));
    }
}

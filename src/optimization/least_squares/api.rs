//! High-level entry point for bounded nonlinear least squares.
//!
//! Validates the box and the starting point, then dispatches to either the
//! projected Levenberg–Marquardt solver or argmin's L-BFGS over the logistic
//! box transform.
use crate::optimization::{
    errors::OptResult,
    least_squares::{
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        levmar::run_levenberg_marquardt,
        run::run_lbfgs,
        traits::{LeastSquaresProblem, LineSearcher, LsqOutcome, SolverMethod, SolverOptions},
        types::Theta,
        validation::{validate_bounds, validate_residuals},
    },
};

/// Minimize `0.5·‖r(x)‖²` subject to `lo <= x <= hi`.
///
/// # Behavior
/// - Validates bounds and `x0` via [`validate_bounds`].
/// - Evaluates `r(x0)` once to fix the residual length and reject
///   non-finite starting residuals.
/// - Dispatches on `opts.method`.
///
/// # Errors
/// - Bounds or start-point validation failures.
/// - Residual errors at `x0`.
/// - Back-end runtime errors (line-search failures, Jacobian errors).
///
/// # Example
/// ```no_run
/// use ndarray::{array, Array1};
/// use rust_qmri::optimization::errors::OptResult;
/// use rust_qmri::optimization::least_squares::{minimize, LeastSquaresProblem, SolverOptions};
///
/// struct Line { lo: Array1<f64>, hi: Array1<f64> }
/// impl LeastSquaresProblem for Line {
///     fn residuals(&self, x: &Array1<f64>) -> OptResult<Array1<f64>> {
///         Ok(array![1.0 - x[0], 2.0 - x[0]])
///     }
///     fn bounds(&self) -> (&Array1<f64>, &Array1<f64>) { (&self.lo, &self.hi) }
/// }
///
/// let line = Line { lo: array![0.0], hi: array![5.0] };
/// let out = minimize(&line, array![0.5], &SolverOptions::default())?;
/// assert!((out.x_hat[0] - 1.5).abs() < 1e-8);
/// # Ok::<(), rust_qmri::optimization::errors::OptError>(())
/// ```
pub fn minimize<P: LeastSquaresProblem + ?Sized>(
    problem: &P, x0: Theta, opts: &SolverOptions,
) -> OptResult<LsqOutcome> {
    let (lo, hi) = problem.bounds();
    validate_bounds(lo, hi, &x0)?;
    let r0 = problem.residuals(&x0)?;
    let n_residuals = r0.len();
    validate_residuals(&r0, n_residuals)?;

    match opts.method {
        SolverMethod::LevenbergMarquardt => {
            run_levenberg_marquardt(problem, x0, n_residuals, opts)
        }
        SolverMethod::Lbfgs(searcher) => {
            let adapter = ArgMinAdapter::new(problem, n_residuals);
            let u0 = adapter.to_u(&x0);
            match searcher {
                LineSearcher::MoreThuente => {
                    let solver = build_optimizer_more_thuente(opts)?;
                    run_lbfgs(u0, opts, adapter, solver)
                }
                LineSearcher::HagerZhang => {
                    let solver = build_optimizer_hager_zhang(opts)?;
                    run_lbfgs(u0, opts, adapter, solver)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptError,
        least_squares::{
            traits::{LmSettings, Tolerances},
            types::{Jacobian, Residuals},
        },
    };
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Dispatch to each back-end on a smooth two-parameter problem.
    // - Up-front rejection of invalid starting points.
    // -------------------------------------------------------------------------

    /// Saturation-recovery curve y = a·(1 - exp(-t/b)).
    struct Recovery {
        t: Array1<f64>,
        y: Array1<f64>,
        lo: Theta,
        hi: Theta,
    }

    impl Recovery {
        fn new(a: f64, b: f64) -> Self {
            let t = array![0.1, 0.3, 0.6, 1.0, 2.0, 4.0];
            let y = t.mapv(|t| a * (1.0 - (-t / b).exp()));
            Self { t, y, lo: array![0.01, 0.01], hi: array![5.0, 5.0] }
        }
    }

    impl LeastSquaresProblem for Recovery {
        fn residuals(&self, x: &Theta) -> OptResult<Residuals> {
            Ok(&self.y - &self.t.mapv(|t| x[0] * (1.0 - (-t / x[1]).exp())))
        }

        fn bounds(&self) -> (&Theta, &Theta) {
            (&self.lo, &self.hi)
        }

        fn jacobian(&self, x: &Theta) -> OptResult<Jacobian> {
            let mut jac = Array2::zeros((self.t.len(), 2));
            for (i, &t) in self.t.iter().enumerate() {
                let e = (-t / x[1]).exp();
                jac[[i, 0]] = -(1.0 - e);
                jac[[i, 1]] = x[0] * e * t / (x[1] * x[1]);
            }
            Ok(jac)
        }
    }

    fn options(method: SolverMethod) -> SolverOptions {
        SolverOptions::new(
            method,
            Tolerances::new(Some(1e-10), Some(1e-16), Some(500)).expect("valid tolerances"),
            LmSettings::default(),
            None,
            false,
        )
        .expect("valid options")
    }

    #[test]
    // Purpose
    // -------
    // Verify every back-end recovers the generating parameters.
    //
    // Given
    // -----
    // - Zero-noise recovery data with a = 1.3, b = 0.8; start [1, 1].
    //
    // Expect
    // ------
    // - LM to 1e-6 relative, both L-BFGS variants to 1e-3 relative.
    fn minimize_dispatches_to_each_backend() {
        let cases = [
            (SolverMethod::LevenbergMarquardt, 1e-6),
            (SolverMethod::Lbfgs(LineSearcher::MoreThuente), 1e-3),
            (SolverMethod::Lbfgs(LineSearcher::HagerZhang), 1e-3),
        ];
        for (method, tol) in cases {
            // Arrange
            let problem = Recovery::new(1.3, 0.8);

            // Act
            let out = minimize(&problem, array![1.0, 1.0], &options(method))
                .expect("minimize should succeed");

            // Assert
            assert_relative_eq!(out.x_hat[0], 1.3, max_relative = tol);
            assert_relative_eq!(out.x_hat[1], 0.8, max_relative = tol);
            assert!(out.x_hat.iter().zip(problem.lo.iter()).all(|(x, l)| x >= l));
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure a start outside the box is rejected before any solver runs.
    //
    // Given
    // -----
    // - x0 = [6, 1] with upper bound 5 on the first parameter.
    //
    // Expect
    // ------
    // - `OptError::InitialOutsideBounds { index: 0, .. }`.
    fn minimize_rejects_start_outside_bounds() {
        // Arrange
        let problem = Recovery::new(1.3, 0.8);

        // Act
        let result = minimize(&problem, array![6.0, 1.0], &SolverOptions::default());

        // Assert
        assert!(matches!(result, Err(OptError::InitialOutsideBounds { index: 0, .. })));
    }
}

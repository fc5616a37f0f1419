//! least_squares::levmar — projected Levenberg–Marquardt.
//!
//! Purpose
//! -------
//! Default back-end for small dense residual models (a handful of
//! parameters, tens of residuals). Each iteration solves the damped normal
//! equations `(JᵀJ + λ·D) δ = -Jᵀr` with `D = diag(JᵀJ)` and projects
//! `x + δ` onto the box.
//!
//! Key behaviors
//! -------------
//! - One damping attempt per iteration: an improving step is accepted and
//!   `λ` shrinks by `lambda_down`; otherwise `λ` grows by `lambda_up`.
//! - The Jacobian (analytic or FD) is only recomputed after an accepted
//!   step.
//! - A trial point whose residuals fail or are non-finite is rejected like
//!   any non-improving step; only the starting point must evaluate cleanly.
//!
//! Termination
//! -----------
//! Converged when any of:
//! - `‖Jᵀr‖∞ < tol_grad`,
//! - relative cost reduction of an accepted step `< tol_cost`,
//! - the projected step is shorter than `tol_step·(‖x‖ + tol_step)`,
//! - the cost drops to [`TARGET_COST`],
//! - `λ` exceeds `max_lambda` (no improving step exists inside the box).
//!
//! Reaching `max_iter` is reported as not converged.
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::{
        finite_diff::jacobian_or_fd,
        traits::{LeastSquaresProblem, LsqOutcome, SolverOptions, half_sum_sq},
        types::{DEFAULT_MAX_ITER, FnEvalMap, Grad, Jacobian, Residuals, TARGET_COST, Theta},
        validation::validate_residuals,
    },
};
use nalgebra::{DMatrix, DVector};
use ndarray::Zip;

const MIN_LAMBDA: f64 = 1e-15;

/// Minimize `0.5·‖r(x)‖²` over the box with projected Levenberg–Marquardt.
///
/// `x0` must already be validated against the bounds (see
/// [`minimize`](super::minimize)).
///
/// # Errors
/// - Residual errors or non-finite residuals at the starting point.
/// - Jacobian errors at an accepted iterate.
/// - Validation errors from [`LsqOutcome::new`].
pub fn run_levenberg_marquardt<P: LeastSquaresProblem + ?Sized>(
    problem: &P, x0: Theta, n_residuals: usize, opts: &SolverOptions,
) -> OptResult<LsqOutcome> {
    let (lo, hi) = problem.bounds();
    let max_iter = opts.tols.max_iter.unwrap_or(DEFAULT_MAX_ITER);
    let settings = &opts.lm;

    let mut x = project(x0, lo, hi);
    let mut residuals = problem.residuals(&x)?;
    validate_residuals(&residuals, n_residuals)?;
    let mut cost = half_sum_sq(&residuals);
    let mut cost_count: u64 = 1;
    let mut jacobian_count: u64 = 0;

    let mut lambda = settings.initial_lambda;
    let mut iterations = 0usize;
    let mut converged = false;
    let mut status = String::from("MaxItersReached");
    let mut normal: Option<(Jacobian, Grad)> = None;
    let mut last_grad: Option<Grad> = None;

    if cost <= TARGET_COST {
        converged = true;
        status = String::from("TargetCostReached");
    }

    while !converged && iterations < max_iter {
        iterations += 1;

        if normal.is_none() {
            let jac = jacobian_or_fd(problem, &x, n_residuals)?;
            jacobian_count += 1;
            let grad = jac.t().dot(&residuals);
            let jtj = jac.t().dot(&jac);
            last_grad = Some(grad.clone());
            if let Some(tol) = opts.tols.tol_grad {
                if inf_norm(&grad) < tol {
                    converged = true;
                    status = String::from("GradientToleranceReached");
                    break;
                }
            }
            normal = Some((jtj, grad));
        }
        let Some((jtj, grad)) = normal.as_ref() else {
            return Err(OptError::UnknownError);
        };

        let Some(delta) = solve_damped(jtj, grad, lambda) else {
            lambda *= settings.lambda_up;
            if lambda > settings.max_lambda {
                converged = true;
                status = String::from("DampingLimitReached");
            }
            continue;
        };

        let x_new = project(&x + &delta, lo, hi);
        let step = &x_new - &x;
        if l2_norm(&step) <= settings.tol_step * (l2_norm(&x) + settings.tol_step) {
            converged = true;
            status = String::from("StepToleranceReached");
            break;
        }

        cost_count += 1;
        let trial = evaluate_trial(problem, &x_new, n_residuals);
        match trial {
            Some((r_new, cost_new)) if cost_new < cost => {
                let rel_reduction = (cost - cost_new) / cost;
                x = x_new;
                residuals = r_new;
                cost = cost_new;
                lambda = (lambda * settings.lambda_down).max(MIN_LAMBDA);
                normal = None;
                if cost <= TARGET_COST {
                    converged = true;
                    status = String::from("TargetCostReached");
                } else if opts.tols.tol_cost.is_some_and(|tol| rel_reduction < tol) {
                    converged = true;
                    status = String::from("CostToleranceReached");
                }
            }
            _ => {
                lambda *= settings.lambda_up;
                if lambda > settings.max_lambda {
                    converged = true;
                    status = String::from("DampingLimitReached");
                }
            }
        }
    }

    let mut fn_evals = FnEvalMap::new();
    fn_evals.insert("cost_count".to_string(), cost_count);
    fn_evals.insert("jacobian_count".to_string(), jacobian_count);
    LsqOutcome::new(Some(x), cost, converged, status, iterations as u64, fn_evals, last_grad)
}

// ---- Helper Methods ----

/// Clamp every coordinate into `[lo, hi]`.
pub fn project(mut x: Theta, lo: &Theta, hi: &Theta) -> Theta {
    Zip::from(&mut x).and(lo).and(hi).for_each(|v, &l, &h| {
        *v = v.clamp(l, h);
    });
    x
}

/// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = -g`; zero diagonal entries are damped by `λ`.
fn solve_damped(jtj: &Jacobian, grad: &Grad, lambda: f64) -> Option<Theta> {
    let n = grad.len();
    let mut a = DMatrix::<f64>::from_fn(n, n, |i, j| jtj[[i, j]]);
    for i in 0..n {
        let d = jtj[[i, i]];
        a[(i, i)] = if d > 0.0 { d * (1.0 + lambda) } else { lambda };
    }
    let b = DVector::<f64>::from_iterator(n, grad.iter().map(|g| -g));
    let solution = match a.clone().cholesky() {
        Some(chol) => chol.solve(&b),
        None => a.lu().solve(&b)?,
    };
    if solution.iter().all(|v| v.is_finite()) {
        Some(Theta::from_iter(solution.iter().copied()))
    } else {
        None
    }
}

fn evaluate_trial<P: LeastSquaresProblem + ?Sized>(
    problem: &P, x: &Theta, n_residuals: usize,
) -> Option<(Residuals, f64)> {
    let r = problem.residuals(x).ok()?;
    validate_residuals(&r, n_residuals).ok()?;
    let c = half_sum_sq(&r);
    c.is_finite().then_some((r, c))
}

fn inf_norm(v: &Grad) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn l2_norm(v: &Theta) -> f64 {
    v.dot(v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::least_squares::traits::{Tolerances, SolverMethod};
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Recovery of exact parameters on a zero-noise exponential model, with
    //   and without an analytic Jacobian.
    // - Box projection when the unconstrained optimum lies outside.
    // - Reporting of the iteration cap as non-convergence.
    // - Error on a starting point with non-finite residuals.
    // -------------------------------------------------------------------------

    struct ExpDecay {
        t: Array1<f64>,
        y: Array1<f64>,
        lo: Theta,
        hi: Theta,
        analytic: bool,
    }

    impl ExpDecay {
        fn exact(a: f64, k: f64, analytic: bool) -> Self {
            let t = array![0.0, 0.25, 0.5, 1.0, 1.5, 2.0, 3.0];
            let y = t.mapv(|t| a * (-k * t).exp());
            Self { t, y, lo: array![0.0, 0.0], hi: array![10.0, 10.0], analytic }
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

    #[test]
    // Purpose
    // -------
    // Verify zero-noise data are fitted exactly with both Jacobian paths.
    //
    // Given
    // -----
    // - y = 2·exp(-0.7 t), start [1, 1].
    //
    // Expect
    // ------
    // - Converged, parameters recovered to 1e-6 relative.
    fn levenberg_marquardt_recovers_exponential_parameters() {
        for analytic in [true, false] {
            // Arrange
            let problem = ExpDecay::exact(2.0, 0.7, analytic);
            let opts = SolverOptions::default();

            // Act
            let out = run_levenberg_marquardt(&problem, array![1.0, 1.0], 7, &opts)
                .expect("LM should succeed");

            // Assert
            assert!(out.converged, "status: {}", out.status);
            assert_relative_eq!(out.x_hat[0], 2.0, max_relative = 1e-6);
            assert_relative_eq!(out.x_hat[1], 0.7, max_relative = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure iterates stay in the box when the optimum lies outside it.
    //
    // Given
    // -----
    // - Data generated with amplitude 2 but an upper amplitude bound of 1.5.
    //
    // Expect
    // ------
    // - The amplitude estimate sits on the bound.
    fn levenberg_marquardt_respects_bounds() {
        // Arrange
        let mut problem = ExpDecay::exact(2.0, 0.7, true);
        problem.hi = array![1.5, 10.0];

        // Act
        let out = run_levenberg_marquardt(&problem, array![1.0, 1.0], 7, &SolverOptions::default())
            .expect("LM should succeed");

        // Assert
        assert!(out.x_hat[0] <= 1.5);
        assert_relative_eq!(out.x_hat[0], 1.5, max_relative = 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Check that hitting the iteration cap is not reported as convergence.
    //
    // Given
    // -----
    // - `max_iter = 1` and no other tolerances, starting far from the optimum.
    //
    // Expect
    // ------
    // - `converged == false` and status `MaxItersReached`.
    fn levenberg_marquardt_reports_iteration_cap() {
        // Arrange
        let problem = ExpDecay::exact(2.0, 0.7, true);
        let opts = SolverOptions {
            method: SolverMethod::LevenbergMarquardt,
            tols: Tolerances::new(None, None, Some(1)).expect("valid tolerances"),
            ..SolverOptions::default()
        };

        // Act
        let out = run_levenberg_marquardt(&problem, array![0.1, 5.0], 7, &opts)
            .expect("LM should return an outcome");

        // Assert
        assert!(!out.converged);
        assert_eq!(out.status, "MaxItersReached");
        assert_eq!(out.iterations, 1);
    }

    #[test]
    // Purpose
    // -------
    // Verify a non-finite starting residual is an error, not a panic.
    //
    // Given
    // -----
    // - Data containing NaN.
    //
    // Expect
    // ------
    // - `OptError::NonFiniteResidual`.
    fn levenberg_marquardt_rejects_non_finite_start() {
        // Arrange
        let mut problem = ExpDecay::exact(2.0, 0.7, true);
        problem.y[2] = f64::NAN;

        // Act
        let result =
            run_levenberg_marquardt(&problem, array![1.0, 1.0], 7, &SolverOptions::default());

        // Assert
        assert!(matches!(result, Err(OptError::NonFiniteResidual { index: 2, .. })));
    }

    #[test]
    // Purpose
    // -------
    // Check projection clamps coordinate-wise.
    //
    // Given
    // -----
    // - x = [-1, 0.5, 3] in [0, 1]³.
    //
    // Expect
    // ------
    // - [0, 0.5, 1].
    fn project_clamps_each_coordinate() {
        // Act
        let p = project(array![-1.0, 0.5, 3.0], &array![0.0, 0.0, 0.0], &array![1.0, 1.0, 1.0]);

        // Assert
        assert_eq!(p, array![0.0, 0.5, 1.0]);
    }
}

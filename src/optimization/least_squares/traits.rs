//! Public API surface for bounded nonlinear least squares.
//!
//! - [`LeastSquaresProblem`]: trait callers implement for a residual model.
//! - [`SolverOptions`], [`Tolerances`], [`LmSettings`]: solver configuration.
//! - [`SolverMethod`] / [`LineSearcher`]: choice of back-end.
//! - [`LsqOutcome`]: normalized result returned by [`minimize`](super::minimize).
//!
//! Convention: we minimize `c(x) = 0.5·‖r(x)‖²` over the box `lo <= x <= hi`.
//! If an analytic Jacobian is provided it must be `∂r/∂x` (residuals, not
//! model predictions).
use crate::optimization::{
    errors::{OptError, OptResult},
    least_squares::{
        types::{Cost, FnEvalMap, Grad, Jacobian, Residuals, Theta},
        validation::{validate_theta_hat, validate_value, verify_tol_cost, verify_tol_grad},
    },
};
use argmin_math::ArgminL2Norm;
use std::str::FromStr;

/// User-implemented residual model on a box-constrained domain.
///
/// Required:
/// - `residuals(&Theta) -> OptResult<Residuals>`: evaluate `r(x)`. Invalid
///   inputs or degenerate parameter combinations must be reported as
///   errors, never panics.
/// - `bounds() -> (&Theta, &Theta)`: lower and upper bounds, one entry per
///   parameter.
///
/// Optional:
/// - `jacobian(&Theta) -> OptResult<Jacobian>`: analytic `∂r/∂x`. When not
///   implemented, finite differences are used automatically.
pub trait LeastSquaresProblem {
    // Required methods
    fn residuals(&self, x: &Theta) -> OptResult<Residuals>;
    fn bounds(&self) -> (&Theta, &Theta);

    // Optional methods
    fn jacobian(&self, _x: &Theta) -> OptResult<Jacobian> {
        Err(OptError::JacobianNotImplemented)
    }

    /// Number of free parameters, taken from the bounds.
    fn n_params(&self) -> usize {
        self.bounds().0.len()
    }
}

/// Choice of line search used inside the L-BFGS solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

/// Solver back-end.
///
/// - `LevenbergMarquardt`: damped Gauss–Newton with projection onto the box.
/// - `Lbfgs(_)`: argmin L-BFGS on the logistic reparameterization of the box.
///
/// Parsing is case-insensitive: `"lm"`, `"levenbergmarquardt"`, `"lbfgs"`
/// (More–Thuente), `"lbfgs-morethuente"`, `"lbfgs-hagerzhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverMethod {
    #[default]
    LevenbergMarquardt,
    Lbfgs(LineSearcher),
}

impl FromStr for SolverMethod {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lm" | "levenbergmarquardt" | "levenberg-marquardt" => {
                Ok(SolverMethod::LevenbergMarquardt)
            }
            "lbfgs" | "lbfgs-morethuente" => Ok(SolverMethod::Lbfgs(LineSearcher::MoreThuente)),
            "lbfgs-hagerzhang" => Ok(SolverMethod::Lbfgs(LineSearcher::HagerZhang)),
            _ => Err(OptError::InvalidSolverMethod {
                name: s.to_string(),
                reason: "Valid options are 'lm', 'lbfgs', 'lbfgs-morethuente' or 'lbfgs-hagerzhang'.",
            }),
        }
    }
}

/// Numerical tolerances and iteration limits used by the solvers.
///
/// - `tol_grad`: terminate when the cost gradient falls below this threshold
///   (infinity norm for Levenberg–Marquardt, L2 norm for L-BFGS).
/// - `tol_cost`: terminate when the cost change falls below this threshold
///   (relative reduction for Levenberg–Marquardt, absolute for L-BFGS).
/// - `max_iter`: hard cap on the number of iterations.
///
/// Any field can be `None` but **at least one** must be provided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Construct validated tolerances.
    ///
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] if all three are `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for
    ///   non-finite or non-positive tolerances.
    /// - [`OptError::InvalidMaxIter`] if `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        verify_tol_cost(tol_cost)?;
        verify_tol_grad(tol_grad)?;
        if let Some(max_iter) = max_iter {
            if max_iter == 0 {
                return Err(OptError::InvalidMaxIter {
                    max_iter,
                    reason: "Maximum iterations must be greater than zero.",
                });
            }
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self { tol_grad: Some(1e-10), tol_cost: Some(1e-12), max_iter: Some(200) }
    }
}

/// Damping schedule for Levenberg–Marquardt.
///
/// The diagonal of `JᵀJ` is inflated by `lambda`; rejected steps multiply
/// `lambda` by `lambda_up`, accepted steps by `lambda_down`. The solve stops
/// once `lambda` exceeds `max_lambda` or the projected step is shorter than
/// `tol_step·(‖x‖ + tol_step)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSettings {
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub max_lambda: f64,
    pub tol_step: f64,
}

impl LmSettings {
    pub fn new(
        initial_lambda: f64, lambda_up: f64, lambda_down: f64, max_lambda: f64, tol_step: f64,
    ) -> OptResult<Self> {
        if !initial_lambda.is_finite() || initial_lambda <= 0.0 {
            return Err(OptError::InvalidDamping {
                value: initial_lambda,
                reason: "Initial damping must be finite and positive.",
            });
        }
        if !lambda_up.is_finite() || lambda_up <= 1.0 {
            return Err(OptError::InvalidDamping {
                value: lambda_up,
                reason: "Damping increase factor must be finite and > 1.",
            });
        }
        if !(lambda_down > 0.0 && lambda_down < 1.0) {
            return Err(OptError::InvalidDamping {
                value: lambda_down,
                reason: "Damping decrease factor must lie in (0, 1).",
            });
        }
        if !max_lambda.is_finite() || max_lambda < initial_lambda {
            return Err(OptError::InvalidDamping {
                value: max_lambda,
                reason: "Maximum damping must be finite and >= the initial damping.",
            });
        }
        if !tol_step.is_finite() || tol_step <= 0.0 {
            return Err(OptError::InvalidDamping {
                value: tol_step,
                reason: "Step tolerance must be finite and positive.",
            });
        }
        Ok(Self { initial_lambda, lambda_up, lambda_down, max_lambda, tol_step })
    }
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
            tol_step: 1e-12,
        }
    }
}

/// Solver-level configuration.
///
/// Fields:
/// - `method`: back-end choice.
/// - `tols`: numerical tolerances and iteration limit.
/// - `lm`: damping schedule (Levenberg–Marquardt only).
/// - `lbfgs_mem`: L-BFGS history size; `None` uses [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM).
/// - `verbose`: attaches an argmin observer (behind the `obs_slog` feature).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolverOptions {
    pub method: SolverMethod,
    pub tols: Tolerances,
    pub lm: LmSettings,
    pub lbfgs_mem: Option<usize>,
    pub verbose: bool,
}

impl SolverOptions {
    pub fn new(
        method: SolverMethod, tols: Tolerances, lm: LmSettings, lbfgs_mem: Option<usize>,
        verbose: bool,
    ) -> OptResult<Self> {
        if let Some(m) = lbfgs_mem {
            if m == 0 {
                return Err(OptError::InvalidLBFGSMem {
                    mem: m,
                    reason: "L-BFGS memory must be greater than zero.",
                });
            }
        }
        Ok(Self { method, tols, lm, lbfgs_mem, verbose })
    }
}

/// Canonical result returned by `minimize`.
///
/// - `x_hat`: best parameter vector found (inside the box).
/// - `cost`: `0.5·‖r(x_hat)‖²`.
/// - `converged`: `true` when a convergence criterion fired; reaching the
///   iteration cap is **not** convergence.
/// - `status`: human-readable termination status.
/// - `iterations`: number of outer iterations performed.
/// - `fn_evals`: evaluation counters (`"cost_count"`, `"jacobian_count"`, ...).
/// - `grad_norm`: L2 norm of the last available cost gradient, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LsqOutcome {
    pub x_hat: Theta,
    pub cost: Cost,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl LsqOutcome {
    /// Build a validated outcome from raw solver state.
    ///
    /// # Errors
    /// - Propagates validation errors for `x_hat` (missing or non-finite)
    ///   and `cost` (non-finite).
    pub fn new(
        x_hat_opt: Option<Theta>, cost: Cost, converged: bool, status: String, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let x_hat = validate_theta_hat(x_hat_opt)?;
        validate_value(cost)?;
        let grad_norm = grad.map(|g| g.l2_norm());
        Ok(Self {
            x_hat,
            cost,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm,
        })
    }
}

/// `0.5·‖r‖²`.
pub fn half_sum_sq(r: &Residuals) -> Cost {
    0.5 * r.dot(r)
}

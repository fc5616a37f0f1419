//! least_squares::types — shared numeric aliases and solver wiring.
//!
//! Purpose
//! -------
//! Centralize the numeric types and solver aliases used by the
//! least-squares layer, so the rest of the code can stay agnostic to
//! `ndarray` and argmin generics.
//!
//! Conventions
//! -----------
//! - `Theta`, `Grad` and `Residuals` are column vectors; `Jacobian` is
//!   `n_residuals × n_params` with `J[[i, j]] = ∂r_i / ∂x_j`.
//! - `Cost` is always `0.5·‖r‖²`.
//! - The L-BFGS aliases operate on the unconstrained `u`-space parameters
//!   produced by the logistic box map.
use argmin::solver::{
    linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
    quasinewton::LBFGS,
};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Parameter vector in the solver's (scaled) coordinates.
pub type Theta = Array1<f64>;

/// Gradient of the cost with respect to `Theta`.
pub type Grad = Array1<f64>;

/// Residual vector `r(x) = data - model(x)`.
pub type Residuals = Array1<f64>;

/// Dense residual Jacobian, `n_residuals × n_params`.
pub type Jacobian = Array2<f64>;

/// Scalar objective `0.5·‖r‖²`.
pub type Cost = f64;

/// Function-evaluation counters as reported by the solver.
///
/// Maps human-readable counter names (e.g., `"cost_count"`) to counts.
pub type FnEvalMap = HashMap<String, u64>;

/// Default history size (`m`) for L-BFGS runs.
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Default iteration cap when `Tolerances::max_iter` is unset.
pub const DEFAULT_MAX_ITER: usize = 200;

/// Costs at or below this value count as an exact fit.
pub const TARGET_COST: f64 = 1e-30;

/// Hager–Zhang line search specialized to this crate’s numeric types.
pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;

/// More–Thuente line search specialized to this crate’s numeric types.
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

/// L-BFGS solver wired to the Hager–Zhang line search.
pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;

/// L-BFGS solver wired to the More–Thuente line search.
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;

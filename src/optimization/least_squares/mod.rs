//! least_squares — bounded nonlinear least squares with pluggable back-ends.
//!
//! Purpose
//! -------
//! Provide the solver layer behind every voxel fit: callers implement a
//! single trait, [`LeastSquaresProblem`], and invoke [`minimize`] to fit
//! parameters inside a box with either projected Levenberg–Marquardt or
//! argmin's L-BFGS.
//!
//! Key behaviors
//! -------------
//! - [`minimize`] validates the box and the starting point, fixes the
//!   residual length from `r(x0)`, and dispatches on [`SolverMethod`].
//! - [`levmar`] implements damped Gauss–Newton with box projection; it is
//!   the default and the most reliable choice for small dense models.
//! - [`adapter`] exposes the problem to argmin in an unconstrained space
//!   via the logistic box map; [`builders`] and [`run`] construct and
//!   execute the L-BFGS solvers.
//! - [`finite_diff`] supplies residual Jacobians when the problem has no
//!   analytic one.
//!
//! Invariants & assumptions
//! ------------------------
//! - Residual models treat invalid inputs as recoverable [`OptError`](crate::optimization::errors::OptError)
//!   values, never panics.
//! - Parameters are expected in scaled, O(1) coordinates; finite-difference
//!   steps and tolerances are tuned for that regime.
//! - Configuration types are validated on construction.
//!
//! Conventions
//! -----------
//! - Cost is always `0.5·‖r‖²`; Jacobians are `∂r/∂x` with shape
//!   `n_residuals × n_params`.
//! - `LsqOutcome::converged` is `false` when the iteration cap was reached.
//! - This module never logs; callers decide how to report outcomes.
//!
//! Testing notes
//! -------------
//! - Unit tests in submodules cover option validation, FD Jacobians,
//!   chain-rule gradients, LM convergence and projection, and dispatch to
//!   every back-end on toy curves.

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod levmar;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::finite_diff::jacobian_or_fd;
pub use self::traits::{
    LeastSquaresProblem, LineSearcher, LmSettings, LsqOutcome, SolverMethod, SolverOptions,
    Tolerances,
};
pub use self::types::{
    Cost, DEFAULT_LBFGS_MEM, DEFAULT_MAX_ITER, FnEvalMap, Grad, Jacobian, Residuals, Theta,
};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_qmri::optimization::least_squares::prelude::*;
//
// to import the main solver surface in a single line.

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{
        LeastSquaresProblem, LineSearcher, LmSettings, LsqOutcome, SolverMethod, SolverOptions,
        Tolerances,
    };
    pub use super::types::{Jacobian, Residuals, Theta};
}

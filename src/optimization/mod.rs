//! optimization — bounded least-squares stack, numerical helpers, and
//! unified error surface.
//!
//! Purpose
//! -------
//! Provide a cohesive optimization layer for voxelwise model fitting:
//! a bounded nonlinear least-squares API with interchangeable back-ends,
//! numerically stable parameter transforms, and a single error/result
//! surface. Callers implement a residual model, choose tolerances, and
//! obtain fitted parameters and diagnostics without touching backend
//! solver details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **minimizing** `0.5·‖r(x)‖²` over a box
//!   (`least_squares`), including configuration of solvers and stopping
//!   criteria.
//! - Supply shared numerical primitives (`numerical_stability`) for mapping
//!   box-constrained parameters into an unconstrained space.
//! - Normalize configuration issues, numerical failures, and backend solver
//!   errors into a single enum (`errors::OptError`) with a common result
//!   alias (`OptResult<T>`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Residual models report domain violations (division by ~0, non-finite
//!   signals) as recoverable errors, not panics.
//! - Inputs are assumed finite once validation has passed; invalid states
//!   are reported as `OptError`.
//!
//! Conventions
//! -----------
//! - Parameters, residuals and Jacobians use `ndarray` aliases (`Theta`,
//!   `Residuals`, `Jacobian`).
//! - Public entrypoints that can fail return `OptResult<T>`; callers never
//!   see raw argmin errors.
//! - This module and its submodules avoid I/O and logging; the pipeline
//!   layer is responsible for reporting progress.
//!
//! Downstream usage
//! ----------------
//! - `fitting::core::fit_function` builds a `LeastSquaresProblem` per voxel
//!   and calls `minimize`.
//! - `inference::covariance` reuses `EIGEN_EPS` and the finite-difference
//!   Jacobians.
//! - Front-ends typically import `optimization::prelude::*`.
//!
//! Testing notes
//! -------------
//! - Unit tests in the submodules focus on local concerns: option
//!   validation, FD Jacobians, chain-rule gradients, solver convergence,
//!   transform round trips, and argmin error conversions.

pub mod errors;
pub mod least_squares;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_qmri::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::least_squares::prelude::*;
    pub use super::numerical_stability::prelude::*;
}

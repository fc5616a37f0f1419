//! numerical_stability — numerically robust transformations and tolerances.
//!
//! Purpose
//! -------
//! Collect numerically stable scalar transforms for mapping box-constrained
//! parameters into an unconstrained optimizer space and back, and
//! centralize the small tolerances shared by the solver and covariance
//! code.
//!
//! Key behaviors
//! -------------
//! - Provide stable scalar transforms (`safe_logistic`, `safe_logit`) that
//!   never overflow for large arguments.
//! - Implement the logistic box map `x = lo + (hi - lo)·σ(u)` together with
//!   its inverse and derivative, used by the L-BFGS back-end.
//! - Centralize `LOGIT_EPS` and `EIGEN_EPS`.
//!
//! Invariants & assumptions
//! ------------------------
//! - All transforms assume finite `f64` inputs; bounds are validated in the
//!   solver layer before any transform is applied.
//! - `from_bounded` clamps points on the boundary to
//!   `[LOGIT_EPS, 1 - LOGIT_EPS]` of the box width, so the inverse is finite.
//!
//! Conventions
//! -----------
//! - Element-wise helpers are scalar; callers map them over `ndarray`
//!   vectors.
//! - This module never logs, performs I/O, or touches global state.
//!
//! Downstream usage
//! ----------------
//! - `least_squares::adapter` uses the box map and its derivative for the
//!   chain rule `∂c/∂u = (Jᵀr) ⊙ dx/du`.
//! - `inference::covariance` uses `EIGEN_EPS` to truncate the spectrum of
//!   `JᵀJ`.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] cover agreement with naive formulas,
//!   tail behaviour and the box-map round trip.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    EIGEN_EPS, LOGIT_EPS, bounded_deriv, from_bounded, safe_logistic, safe_logit, to_bounded,
};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_qmri::optimization::numerical_stability::prelude::*;
//
// to import the main numerical-stability surface in a single line.

pub mod prelude {
    pub use super::transformations::{
        EIGEN_EPS, LOGIT_EPS, bounded_deriv, from_bounded, safe_logistic, safe_logit, to_bounded,
    };
}

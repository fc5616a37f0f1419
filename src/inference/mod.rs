//! inference — parameter uncertainty for fitted voxels.
//!
//! Purpose
//! -------
//! Provide post-estimation uncertainty quantification on top of a
//! least-squares fit: the Gauss–Newton covariance `σ²·(JᵀJ)⁺` evaluated at
//! the optimum, in the solver's scaled coordinates.
//!
//! Key behaviors
//! -------------
//! - [`covariance_from_jacobian`] builds the covariance from the residual
//!   Jacobian and residuals with an eigen-truncated pseudoinverse.
//! - [`upper_triangle`] flattens it for the `COV` output channel.
//!
//! Invariants & assumptions
//! ------------------------
//! - Residual variance uses `m - n` degrees of freedom; fits with no spare
//!   measurements have no covariance.
//! - Weakly identified directions are truncated, never inverted.
//!
//! Downstream usage
//! ----------------
//! - `fitting::core::fit_function` calls this after a converged solve and
//!   maps the result into natural units via `Scaling::unscale_covariance`.
//!
//! Testing notes
//! -------------
//! - Unit tests live in [`covariance`].

pub mod covariance;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::covariance::{covariance_from_jacobian, upper_triangle};

// ---- Optional convenience prelude for downstream crates ------------------
//
// Downstream crates can `use rust_qmri::inference::prelude::*;` to import the
// primary inference surface in a single line.

pub mod prelude {
    pub use super::covariance::{covariance_from_jacobian, upper_triangle};
}

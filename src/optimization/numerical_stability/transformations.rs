//! Numerical stability utilities.
//!
//! Provides safe implementations of the nonlinear transforms used to move
//! box-constrained parameters into an unconstrained space and back. The
//! functions here follow guarded strategies similar to those in major ML
//! libraries (e.g. PyTorch, TensorFlow), using explicit cutoffs to keep
//! `f64` arithmetic in a well-conditioned regime.
//!
//! # Provided items
//! - [`LOGIT_EPS`]: clamp applied to probabilities before taking a logit.
//! - [`EIGEN_EPS`]: relative eigenvalue floor for pseudoinverses.
//! - [`safe_logistic(x)`]: stable `1 / (1 + exp(-x))`.
//! - [`safe_logit(p)`]: inverse of the logistic on `(0, 1)` with clamping.
//! - [`to_bounded`], [`from_bounded`], [`bounded_deriv`]: the box map
//!   `x = lo + (hi - lo)·σ(u)`, its inverse and `dx/du`.
//!
//! # Rationale
//! Quasi-Newton solvers in argmin are unconstrained; the box map lets them
//! honour parameter bounds without projection.

/// Probabilities are clamped to `[LOGIT_EPS, 1 - LOGIT_EPS]` before `logit`.
///
/// A start value sitting exactly on a bound would otherwise map to `±∞`.
pub const LOGIT_EPS: f64 = 1e-10;

/// Relative eigenvalue threshold used when forming pseudoinverses.
///
/// Eigenvalues `λ_k <= EIGEN_EPS · λ_max` are treated as zero.
pub const EIGEN_EPS: f64 = 1e-12;

/// Numerically stable logistic: `σ(x) = 1 / (1 + exp(-x))`.
///
/// Evaluates the branch that never exponentiates a large positive number.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Stable logit on `(0, 1)`: `ln(p / (1 - p))`.
///
/// `p` is clamped to `[LOGIT_EPS, 1 - LOGIT_EPS]` so the result is finite.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    p.ln() - (-p).ln_1p()
}

/// Map an unconstrained `u` into `[lo, hi]` via `lo + (hi - lo)·σ(u)`.
pub fn to_bounded(u: f64, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * safe_logistic(u)
}

/// Inverse of [`to_bounded`]. A degenerate box (`hi <= lo`) maps to `0`.
pub fn from_bounded(x: f64, lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    if width <= 0.0 {
        return 0.0;
    }
    safe_logit((x - lo) / width)
}

/// Derivative `dx/du` of [`to_bounded`] at `u`.
pub fn bounded_deriv(u: f64, lo: f64, hi: f64) -> f64 {
    let s = safe_logistic(u);
    (hi - lo) * s * (1.0 - s)
}

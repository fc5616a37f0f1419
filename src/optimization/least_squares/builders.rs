//! least_squares::builders — L-BFGS solver construction helpers.
//!
//! Purpose
//! -------
//! Provide small, focused builders for the L-BFGS back-end. These hide
//! argmin's generic wiring and apply crate-level options (tolerances,
//! memory size) so the dispatcher can request a configured solver without
//! touching argmin-specific types.
//!
//! Invariants & assumptions
//! ------------------------
//! - The L-BFGS memory (`m`) is either `opts.lbfgs_mem` or
//!   [`DEFAULT_LBFGS_MEM`].
//! - Invalid tolerances rejected by argmin surface as [`OptError`](crate::optimization::errors::OptError)
//!   through `From<argmin::core::Error>`.
//! - Builders never set the initial parameters or the iteration cap; the
//!   runner owns those.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    least_squares::{
        traits::SolverOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
};

/// Construct L-BFGS with Hager–Zhang line search and the configured tolerances.
///
/// argmin's default step bounds `[ε, 1e5]` are kept; the adapter's
/// saturation wall gives the bracket a positive slope at the far end.
///
/// # Errors
/// Returns an `OptError` when argmin rejects a tolerance.
pub fn build_optimizer_hager_zhang(opts: &SolverOptions) -> OptResult<LbfgsHagerZhang> {
    let hager_zhang = HagerZhangLS::new();
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    let lbfgs = LbfgsHagerZhang::new(hager_zhang, mem);
    configure_lbfgs(lbfgs, opts)
}

/// Construct L-BFGS with More–Thuente line search and the configured tolerances.
///
/// # Errors
/// Returns an `OptError` when argmin rejects a tolerance.
pub fn build_optimizer_more_thuente(opts: &SolverOptions) -> OptResult<LbfgsMoreThuente> {
    let more_thuente = MoreThuenteLS::new();
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    let lbfgs = LbfgsMoreThuente::new(more_thuente, mem);
    configure_lbfgs(lbfgs, opts)
}

/// Apply optional gradient and cost tolerances to an L-BFGS solver.
///
/// When a tolerance is `None` argmin's default remains in effect.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &SolverOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

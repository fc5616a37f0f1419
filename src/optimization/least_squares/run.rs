//! Execution helper that runs an argmin L-BFGS solver on a bounded
//! least-squares problem and returns a crate-friendly [`LsqOutcome`].
use crate::optimization::{
    errors::OptResult,
    least_squares::{
        adapter::ArgMinAdapter,
        traits::{LeastSquaresProblem, LsqOutcome, SolverOptions},
        types::{DEFAULT_MAX_ITER, Grad, TARGET_COST, Theta},
    },
};
#[cfg(feature = "obs_slog")]
use argmin::core::{CostFunction, Gradient};
use argmin::core::{Executor, State, TerminationReason, TerminationStatus};
#[cfg(feature = "obs_slog")]
use argmin_math::ArgminL2Norm;

/// Run an argmin solver in the adapter's unconstrained `u`-space.
///
/// Wires up the adapter, the initial point `u0`, an optional observer
/// (behind `obs_slog`), the iteration cap and a target cost of
/// [`TARGET_COST`], then maps the best `u` back into the box.
///
/// # Errors
/// - Propagates argmin runtime errors (line-search failures, residual
///   errors raised inside the adapter) via `From<argmin::core::Error>`.
/// - Propagates validation errors from [`LsqOutcome::new`].
pub fn run_lbfgs<'a, P, S>(
    u0: Theta, opts: &SolverOptions, problem: ArgMinAdapter<'a, P>, solver: S,
) -> OptResult<LsqOutcome>
where
    P: LeastSquaresProblem + ?Sized,
    S: argmin::core::Solver<
            ArgMinAdapter<'a, P>,
            argmin::core::IterState<Theta, Grad, (), (), (), f64>,
        > + Send
        + 'static,
{
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        log_initial_state(&u0, &problem)?;
    }
    let bounded = ArgMinAdapter::new(problem.problem, problem.n_residuals);
    let max_iter = opts.tols.max_iter.unwrap_or(DEFAULT_MAX_ITER) as u64;
    let mut optimizer = Executor::new(problem, solver);
    optimizer =
        optimizer.configure(|state| state.param(u0).max_iters(max_iter).target_cost(TARGET_COST));
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, argmin::core::observers::ObserverMode::Always);
    }

    let mut result = optimizer.run()?.state().clone();
    let iterations = result.get_iter();
    let function_counts = result.get_func_counts().clone();
    let (converged, status) = classify_termination(result.get_termination_status());
    let grad = result.take_gradient();
    let x_hat = result.take_best_param().map(|u| bounded.to_x(&u));
    LsqOutcome::new(x_hat, result.get_best_cost(), converged, status, iterations, function_counts, grad)
}

/// Map argmin's termination status onto `(converged, status)`.
///
/// Only solver-reported convergence and reaching the target cost count as
/// converged; the iteration cap does not.
pub fn classify_termination(status: &TerminationStatus) -> (bool, String) {
    match status {
        TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
        TerminationStatus::Terminated(reason) => {
            let converged = matches!(
                reason,
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            );
            (converged, format!("{reason:?}"))
        }
    }
}

// ---- Helper Methods ----

#[cfg(feature = "obs_slog")]
fn log_initial_state<P>(u0: &Theta, problem: &ArgMinAdapter<'_, P>) -> OptResult<()>
where
    P: LeastSquaresProblem + ?Sized,
{
    let c0 = problem.cost(u0)?;
    let g0n = problem.gradient(u0).ok().map(|g| g.l2_norm());

    eprintln!(
        "init: cost(u0) = {:.6e}{}",
        c0,
        g0n.map(|n| format!(", ||grad|| = {:.6e}", n)).unwrap_or_default()
    );
    Ok(())
}

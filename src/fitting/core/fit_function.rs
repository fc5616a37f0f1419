//! fitting::core::fit_function — per-voxel fitting.
//!
//! Purpose
//! -------
//! Turn one [`VoxelInput`] into one [`VoxelFit`]: validate the measurements,
//! normalise the data, solve a bounded least-squares problem in scaled
//! coordinates, and map the result back to natural units together with
//! derived values, residuals and an optional covariance.
//!
//! Key behaviors
//! -------------
//! - [`FitFunction`] is the contract the scheduler drives. `fit` never
//!   returns an error: every per-voxel problem is recorded as a
//!   [`FailureReason`] inside the returned [`VoxelFit`].
//! - [`ScaledFit`] is the default implementation:
//!   1. check input lengths and finiteness,
//!   2. divide the data by its maximum when the model has a gain parameter,
//!   3. fit `r(x) = data − signal(unscale(x))` over the scaled box with the
//!      configured solver,
//!   4. unscale, multiply the gain back, compute derived values, residuals
//!      in data units and (optionally) `σ²(JᵀJ)⁺` mapped to natural units.
//! - Analytic model Jacobians are converted to scaled coordinates with
//!   [`Scaling::scale_jacobian`]; models without one fall back to finite
//!   differences inside the solver.
//!
//! Invariants & assumptions
//! ------------------------
//! - A converged fit has finite varying values inside the model bounds.
//! - A failed fit reports the fallback varying values selected by
//!   [`FallbackPolicy`], zero derived values, zero residuals and no
//!   covariance. Its iteration count is kept when the solver ran.
//! - Reaching the iteration cap is a failure (`NotConverged`).
//! - A covariance that cannot be estimated (too few measurements, singular
//!   normal matrix) leaves `covariance == None` without failing the voxel.
//!
//! Conventions
//! -----------
//! - Residuals are `data − model`, in the units of the input images.
//! - This module never logs; the pipeline aggregates failures.
//!
//! Testing notes
//! -------------
//! - Unit tests use small in-file models to cover success, gain handling,
//!   every failure reason and the fallback policies. End-to-end behavior
//!   lives in the integration tests.
use crate::{
    fitting::{
        core::{
            model::Model,
            options::{FallbackPolicy, FitOptions},
            scaling::Scaling,
            voxel::VoxelInput,
        },
        errors::{FitError, FitResult},
    },
    inference::covariance::covariance_from_jacobian,
    optimization::{
        errors::{OptError, OptResult},
        least_squares::{
            jacobian_or_fd, minimize, Jacobian, LeastSquaresProblem, Residuals, SolverOptions,
            Theta,
        },
    },
};
use ndarray::{Array1, Array2, ArrayView1};

/// Why a voxel fit failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Measurement or fixed vector lengths differ from the model's.
    InputLengthMismatch { expected: usize, found: usize },
    /// A measurement or fixed value is NaN or infinite.
    NonFiniteData,
    /// The data maximum is too small to normalise by.
    NonPositiveData { max: f64 },
    /// The solver hit its iteration cap.
    NotConverged { status: String, iterations: usize },
    /// The solver reported an error (e.g. non-finite model signal).
    Solver(OptError),
    /// A fitted parameter was not finite after unscaling.
    NonFiniteResult { index: usize },
    /// The solver estimate could not be mapped back to natural units.
    Scaling(FitError),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InputLengthMismatch { expected, found } => {
                write!(f, "expected {expected} values, found {found}")
            }
            FailureReason::NonFiniteData => write!(f, "non-finite input data"),
            FailureReason::NonPositiveData { max } => {
                write!(f, "data maximum {max} is too small to normalise")
            }
            FailureReason::NotConverged { status, iterations } => {
                write!(f, "not converged after {iterations} iterations ({status})")
            }
            FailureReason::Solver(err) => write!(f, "solver error: {err}"),
            FailureReason::NonFiniteResult { index } => {
                write!(f, "fitted parameter {index} is not finite")
            }
            FailureReason::Scaling(err) => write!(f, "cannot unscale estimate: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    Converged,
    Failed(FailureReason),
}

/// Result of fitting one voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelFit {
    pub varying: Array1<f64>,
    pub derived: Array1<f64>,
    pub residuals: Array1<f64>,
    pub iterations: usize,
    pub status: FitStatus,
    pub covariance: Option<Array2<f64>>,
}

impl VoxelFit {
    pub fn success(&self) -> bool {
        matches!(self.status, FitStatus::Converged)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            FitStatus::Failed(reason) => Some(reason),
            FitStatus::Converged => None,
        }
    }

    /// Root-mean-square residual; 0 for an empty residual vector.
    pub fn rms_residual(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        (self.residuals.dot(&self.residuals) / self.residuals.len() as f64).sqrt()
    }
}

/// Contract between the scheduler and a per-voxel fitter.
pub trait FitFunction: Send + Sync {
    fn model(&self) -> &dyn Model;

    /// Fit one voxel. Never fails; problems are recorded in the status.
    fn fit(&self, voxel: &VoxelInput) -> VoxelFit;
}

/// Bounded least-squares fit in scaled coordinates with gain normalisation.
#[derive(Debug, Clone)]
pub struct ScaledFit<M: Model> {
    model: M,
    scaling: Scaling,
    solver: SolverOptions,
    covariance: bool,
    fallback: FallbackPolicy,
    scaled_lo: Theta,
    scaled_hi: Theta,
    scaled_start: Theta,
}

impl<M: Model> ScaledFit<M> {
    /// Validate the model and precompute its scaled box and start.
    ///
    /// # Errors
    /// - `FitError::InvalidModel` from [`Model::validate`].
    /// - Scaling errors when the model's scaling does not match its
    ///   parameter count.
    pub fn new(model: M, options: &FitOptions) -> FitResult<Self> {
        model.validate()?;
        let scaling = model.scaling()?;
        let scaled_lo = scaling.scale(model.bounds_lo().view())?;
        let scaled_hi = scaling.scale(model.bounds_hi().view())?;
        let scaled_start = scaling.scale(model.start().view())?;
        Ok(Self {
            model,
            scaling,
            solver: options.solver.clone(),
            covariance: options.covariance,
            fallback: options.fallback,
            scaled_lo,
            scaled_hi,
            scaled_start,
        })
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    fn failed(&self, reason: FailureReason, iterations: usize) -> VoxelFit {
        let varying = match self.fallback {
            FallbackPolicy::Start => self.model.start(),
            FallbackPolicy::Zero => Array1::zeros(self.model.n_varying()),
        };
        VoxelFit {
            varying,
            derived: Array1::zeros(self.model.n_derived()),
            residuals: Array1::zeros(self.model.n_measurements()),
            iterations,
            status: FitStatus::Failed(reason),
            covariance: None,
        }
    }

    fn check_input(&self, voxel: &VoxelInput) -> Result<(), FailureReason> {
        let n_inputs = self.model.n_inputs();
        if voxel.inputs.len() != n_inputs {
            return Err(FailureReason::InputLengthMismatch {
                expected: n_inputs,
                found: voxel.inputs.len(),
            });
        }
        for (i, input) in voxel.inputs.iter().enumerate() {
            let expected = self.model.input_size(i);
            if input.len() != expected {
                return Err(FailureReason::InputLengthMismatch { expected, found: input.len() });
            }
        }
        if voxel.fixed.len() != self.model.n_fixed() {
            return Err(FailureReason::InputLengthMismatch {
                expected: self.model.n_fixed(),
                found: voxel.fixed.len(),
            });
        }
        let mut values = voxel.inputs.iter().flat_map(|v| v.iter()).chain(voxel.fixed.iter());
        if values.any(|v| !v.is_finite()) {
            return Err(FailureReason::NonFiniteData);
        }
        Ok(())
    }

    /// Unscale a solver estimate and re-apply the gain.
    fn natural_estimate(
        &self, x_hat: &Theta, gain: Option<(usize, f64)>,
    ) -> Result<Array1<f64>, FailureReason> {
        let mut varying = self.scaling.unscale(x_hat.view()).map_err(FailureReason::Scaling)?;
        if let Some((g, max)) = gain {
            varying[g] *= max;
        }
        if let Some(index) = varying.iter().position(|v| !v.is_finite()) {
            return Err(FailureReason::NonFiniteResult { index });
        }
        Ok(varying)
    }

    /// Covariance of the natural-unit parameters, gain row/column rescaled.
    fn covariance(
        &self, problem: &VoxelProblem<'_, M>, x_hat: &Theta, gain: Option<(usize, f64)>,
    ) -> Option<Array2<f64>> {
        let residuals = problem.residuals(x_hat).ok()?;
        let jacobian = jacobian_or_fd(problem, x_hat, residuals.len()).ok()?;
        let scaled = covariance_from_jacobian(&jacobian, &residuals).ok()?;
        let mut natural = self.scaling.unscale_covariance(&scaled).ok()?;
        if let Some((g, max)) = gain {
            natural.row_mut(g).mapv_inplace(|v| v * max);
            natural.column_mut(g).mapv_inplace(|v| v * max);
        }
        natural.iter().all(|v| v.is_finite()).then_some(natural)
    }
}

impl<M: Model> FitFunction for ScaledFit<M> {
    fn model(&self) -> &dyn Model {
        &self.model
    }

    fn fit(&self, voxel: &VoxelInput) -> VoxelFit {
        if let Err(reason) = self.check_input(voxel) {
            return self.failed(reason, 0);
        }
        let raw = voxel.measurements();

        let gain = match self.model.gain_index() {
            Some(g) => {
                let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if !(max > f64::EPSILON) {
                    return self.failed(FailureReason::NonPositiveData { max }, 0);
                }
                Some((g, max))
            }
            None => None,
        };
        let data = match gain {
            Some((_, max)) => &raw / max,
            None => raw.clone(),
        };

        let problem = VoxelProblem {
            model: &self.model,
            scaling: &self.scaling,
            fixed: voxel.fixed.view(),
            data: &data,
            lo: &self.scaled_lo,
            hi: &self.scaled_hi,
        };
        let outcome = match minimize(&problem, self.scaled_start.clone(), &self.solver) {
            Ok(outcome) => outcome,
            Err(err) => return self.failed(FailureReason::Solver(err), 0),
        };
        if !outcome.converged {
            return self.failed(
                FailureReason::NotConverged {
                    status: outcome.status.clone(),
                    iterations: outcome.iterations,
                },
                outcome.iterations,
            );
        }

        let varying = match self.natural_estimate(&outcome.x_hat, gain) {
            Ok(v) => v,
            Err(reason) => return self.failed(reason, outcome.iterations),
        };

        let fixed = voxel.fixed.view();
        let residuals = &raw - &self.model.signal(varying.view(), fixed);
        let derived = self.model.derived(varying.view(), fixed);
        let covariance = if self.covariance {
            self.covariance(&problem, &outcome.x_hat, gain)
        } else {
            None
        };

        VoxelFit {
            varying,
            derived,
            residuals,
            iterations: outcome.iterations,
            status: FitStatus::Converged,
            covariance,
        }
    }
}

/// One voxel's least-squares problem over scaled parameters.
struct VoxelProblem<'a, M: Model + ?Sized> {
    model: &'a M,
    scaling: &'a Scaling,
    fixed: ArrayView1<'a, f64>,
    data: &'a Array1<f64>,
    lo: &'a Theta,
    hi: &'a Theta,
}

impl<M: Model + ?Sized> VoxelProblem<'_, M> {
    fn natural(&self, x: &Theta) -> Theta {
        x * self.scaling.factors()
    }
}

impl<M: Model + ?Sized> LeastSquaresProblem for VoxelProblem<'_, M> {
    fn residuals(&self, x: &Theta) -> OptResult<Residuals> {
        let signal = self.model.signal(self.natural(x).view(), self.fixed);
        if signal.len() != self.data.len() {
            return Err(OptError::ResidualDimMismatch {
                expected: self.data.len(),
                found: signal.len(),
            });
        }
        Ok(self.data - &signal)
    }

    fn bounds(&self) -> (&Theta, &Theta) {
        (self.lo, self.hi)
    }

    fn jacobian(&self, x: &Theta) -> OptResult<Jacobian> {
        let natural_jac = self
            .model
            .jacobian(self.natural(x).view(), self.fixed)
            .ok_or(OptError::JacobianNotImplemented)?;
        let found = natural_jac.dim();
        let scaled = self.scaling.scale_jacobian(natural_jac).map_err(|_| {
            OptError::JacobianDimMismatch { expected: (self.data.len(), x.len()), found }
        })?;
        Ok(-scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::least_squares::{SolverMethod, Tolerances};
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Successful fits with and without gain normalisation, with analytic
    //   and finite-difference Jacobians.
    // - Each `FailureReason` and both fallback policies.
    // - Covariance estimates in natural units.
    // -------------------------------------------------------------------------

    /// `A·exp(−t/τ)` at t = 0, 1, 2, 3 with gain `A`; analytic Jacobian optional.
    struct Decay {
        analytic: bool,
    }

    const TIMES: [f64; 4] = [0.0, 1.0, 2.0, 3.0];

    impl Model for Decay {
        fn name(&self) -> &str {
            "decay"
        }
        fn varying_names(&self) -> &[&'static str] {
            &["A", "tau"]
        }
        fn fixed_names(&self) -> &[&'static str] {
            &[]
        }
        fn derived_names(&self) -> &[&'static str] {
            &["rate"]
        }
        fn fixed_defaults(&self) -> Array1<f64> {
            Array1::zeros(0)
        }
        fn bounds_lo(&self) -> Array1<f64> {
            array![0.01, 0.1]
        }
        fn bounds_hi(&self) -> Array1<f64> {
            array![100.0, 10.0]
        }
        fn start(&self) -> Array1<f64> {
            array![1.0, 1.0]
        }
        fn gain_index(&self) -> Option<usize> {
            Some(0)
        }
        fn n_inputs(&self) -> usize {
            1
        }
        fn input_size(&self, _image: usize) -> usize {
            TIMES.len()
        }
        fn signal(&self, v: ArrayView1<f64>, _f: ArrayView1<f64>) -> Array1<f64> {
            TIMES.iter().map(|t| v[0] * (-t / v[1]).exp()).collect()
        }
        fn jacobian(&self, v: ArrayView1<f64>, _f: ArrayView1<f64>) -> Option<Array2<f64>> {
            if !self.analytic {
                return None;
            }
            let mut j = Array2::zeros((TIMES.len(), 2));
            for (i, t) in TIMES.iter().enumerate() {
                let e = (-t / v[1]).exp();
                j[[i, 0]] = e;
                j[[i, 1]] = v[0] * e * t / (v[1] * v[1]);
            }
            Some(j)
        }
        fn derived(&self, v: ArrayView1<f64>, _f: ArrayView1<f64>) -> Array1<f64> {
            array![1.0 / v[1]]
        }
    }

    fn voxel(values: Vec<f64>) -> VoxelInput {
        VoxelInput::new([0, 0, 0], vec![Array1::from(values)], Array1::zeros(0))
    }

    fn truth() -> Vec<f64> {
        TIMES.iter().map(|t| 250.0 * (-t / 1.5_f64).exp()).collect()
    }

    #[test]
    // Purpose
    // -------
    // Verify a noiseless decay is recovered in natural units, with the gain
    // re-applied after normalisation, for both Jacobian paths.
    //
    // Given
    // -----
    // - Data 250·exp(−t/1.5); analytic and FD variants of the model.
    //
    // Expect
    // ------
    // - A ≈ 250, τ ≈ 1.5, rate ≈ 1/1.5, residuals ≈ 0, `Converged`.
    fn recovers_parameters_through_gain_normalisation() {
        for analytic in [true, false] {
            // Arrange
            let fit = ScaledFit::new(Decay { analytic }, &FitOptions::default()).expect("valid model");

            // Act
            let out = fit.fit(&voxel(truth()));

            // Assert
            assert!(out.success(), "status: {:?}", out.status);
            assert_relative_eq!(out.varying[0], 250.0, max_relative = 1e-6);
            assert_relative_eq!(out.varying[1], 1.5, max_relative = 1e-6);
            assert_relative_eq!(out.derived[0], 1.0 / 1.5, max_relative = 1e-6);
            assert!(out.rms_residual() < 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure invalid voxels fail with the right reason and fallback values.
    //
    // Given
    // -----
    // - All-zero data (start fallback), a NaN sample and a short vector
    //   (zero fallback).
    //
    // Expect
    // ------
    // - `NonPositiveData` with start values; `NonFiniteData` and
    //   `InputLengthMismatch` with zeros.
    fn invalid_voxels_fail_with_fallback_values() {
        // Arrange
        let start_fit = ScaledFit::new(Decay { analytic: true }, &FitOptions::default()).expect("valid");
        let zero_opts = FitOptions { fallback: FallbackPolicy::Zero, ..FitOptions::default() };
        let zero_fit = ScaledFit::new(Decay { analytic: true }, &zero_opts).expect("valid");

        // Act
        let zeros = start_fit.fit(&voxel(vec![0.0; 4]));
        let nan = zero_fit.fit(&voxel(vec![1.0, f64::NAN, 0.5, 0.2]));
        let short = zero_fit.fit(&voxel(vec![1.0, 0.5]));

        // Assert
        assert_eq!(zeros.failure(), Some(&FailureReason::NonPositiveData { max: 0.0 }));
        assert_eq!(zeros.varying, array![1.0, 1.0]);
        assert_eq!(nan.failure(), Some(&FailureReason::NonFiniteData));
        assert_eq!(nan.varying, array![0.0, 0.0]);
        assert_eq!(
            short.failure(),
            Some(&FailureReason::InputLengthMismatch { expected: 4, found: 2 })
        );
        assert_eq!(short.residuals.len(), 4);
    }

    #[test]
    // Purpose
    // -------
    // Check that hitting the iteration cap is reported as `NotConverged`.
    //
    // Given
    // -----
    // - `max_iter = 1`, gradient tolerance only, far-from-start data.
    //
    // Expect
    // ------
    // - `NotConverged` with one iteration recorded.
    fn iteration_cap_is_a_failure() {
        // Arrange
        let tols = Tolerances::new(Some(1e-14), None, Some(1)).expect("valid tolerances");
        let solver = SolverOptions { method: SolverMethod::LevenbergMarquardt, tols, ..SolverOptions::default() };
        let opts = FitOptions { solver, ..FitOptions::default() };
        let fit = ScaledFit::new(Decay { analytic: true }, &opts).expect("valid");

        // Act
        let out = fit.fit(&voxel(truth()));

        // Assert
        match out.failure() {
            Some(FailureReason::NotConverged { iterations, .. }) => assert_eq!(*iterations, 1),
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(out.iterations, 1);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a solver estimate that cannot be unscaled or is non-finite maps
    // to a failure reason carrying the underlying cause.
    //
    // Given
    // -----
    // - A two-parameter model; a one-element estimate and an estimate whose
    //   second entry is NaN.
    //
    // Expect
    // ------
    // - `Scaling(ScalingLengthMismatch { expected: 2, found: 1 })` and
    //   `NonFiniteResult { index: 1 }`; a valid estimate gets its gain back.
    fn unscaling_failures_carry_their_cause() {
        // Arrange
        let fit = ScaledFit::new(Decay { analytic: true }, &FitOptions::default()).expect("valid");
        let factors = fit.scaling().factors().clone();

        // Act
        let short = fit.natural_estimate(&array![0.5], None);
        let nan = fit.natural_estimate(&array![0.5, f64::NAN], None);
        let good = fit.natural_estimate(&array![0.5, 1.0], Some((0, 4.0)));

        // Assert
        assert_eq!(
            short,
            Err(FailureReason::Scaling(FitError::ScalingLengthMismatch { expected: 2, found: 1 }))
        );
        assert_eq!(nan, Err(FailureReason::NonFiniteResult { index: 1 }));
        let good = good.expect("unscales");
        assert_relative_eq!(good[0], 0.5 * factors[0] * 4.0, max_relative = 1e-12);
        assert_relative_eq!(good[1], factors[1], max_relative = 1e-12);
        assert!(FailureReason::Scaling(FitError::ScalingLengthMismatch { expected: 2, found: 1 })
            .to_string()
            .starts_with("cannot unscale estimate"));
    }

    #[test]
    // Purpose
    // -------
    // Verify covariance estimates are produced in natural units.
    //
    // Given
    // -----
    // - Decay data with a small deterministic perturbation and covariance on.
    //
    // Expect
    // ------
    // - A symmetric 2×2 matrix with positive diagonal.
    fn covariance_is_symmetric_with_positive_diagonal() {
        // Arrange
        let opts = FitOptions { covariance: true, ..FitOptions::default() };
        let fit = ScaledFit::new(Decay { analytic: false }, &opts).expect("valid");
        let mut data = truth();
        data[1] += 2.0;
        data[3] -= 1.0;

        // Act
        let out = fit.fit(&voxel(data));

        // Assert
        assert!(out.success(), "status: {:?}", out.status);
        let cov = out.covariance.expect("covariance estimated");
        assert_eq!(cov.dim(), (2, 2));
        assert!(cov[[0, 0]] > 0.0 && cov[[1, 1]] > 0.0);
        assert_relative_eq!(cov[[0, 1]], cov[[1, 0]], max_relative = 1e-10);
    }
}

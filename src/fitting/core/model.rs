//! fitting::core::model — the signal-model contract.
//!
//! Purpose
//! -------
//! Define the object-safe [`Model`] trait every biophysical signal model
//! implements. A model names its varying, fixed and derived parameters,
//! supplies bounds and a starting point, predicts the concatenated signal
//! of all its input images, and optionally an analytic Jacobian.
//!
//! Key behaviors
//! -------------
//! - The lengths of the name slices define NV (varying), NF (fixed) and
//!   ND (derived); every other vector a model returns must agree.
//! - [`Model::validate`] checks those lengths and `lo <= start <= hi`; the
//!   fit function calls it once at construction.
//! - [`Model::gain_index`] marks a parameter that scales the whole signal
//!   linearly, enabling data normalisation by the data maximum.
//!
//! Invariants & assumptions
//! ------------------------
//! - Models are immutable after construction and shared read-only across
//!   worker threads (`Send + Sync`).
//! - `signal` and `jacobian` may produce non-finite values for degenerate
//!   parameter combinations; the solver layer turns those into voxel
//!   failures.
//!
//! Conventions
//! -----------
//! - All parameter vectors are in natural units.
//! - `signal` output is ordered input image by input image, each block of
//!   length `input_size(i)`.
use crate::fitting::{
    core::scaling::Scaling,
    errors::{FitError, FitResult},
};
use ndarray::{Array1, Array2, ArrayView1};

pub trait Model: Send + Sync {
    /// Registry name, e.g. `"spgr"`.
    fn name(&self) -> &str;

    fn varying_names(&self) -> &[&'static str];
    fn fixed_names(&self) -> &[&'static str];
    fn derived_names(&self) -> &[&'static str];

    fn fixed_defaults(&self) -> Array1<f64>;
    fn bounds_lo(&self) -> Array1<f64>;
    fn bounds_hi(&self) -> Array1<f64>;
    fn start(&self) -> Array1<f64>;

    /// Index of a parameter the signal is linear in, if any.
    fn gain_index(&self) -> Option<usize> {
        None
    }

    /// Number of input images the model consumes.
    fn n_inputs(&self) -> usize;

    /// Measurement count of input image `image`.
    fn input_size(&self, image: usize) -> usize;

    /// Predicted signal of every input image, concatenated.
    fn signal(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64>;

    /// Analytic `∂signal/∂varying` (`n_measurements × NV`), if available.
    fn jacobian(&self, _varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Option<Array2<f64>> {
        None
    }

    /// Derived quantities computed from the fitted parameters.
    fn derived(&self, _varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Array1<f64> {
        Array1::zeros(self.derived_names().len())
    }

    fn n_varying(&self) -> usize {
        self.varying_names().len()
    }

    fn n_fixed(&self) -> usize {
        self.fixed_names().len()
    }

    fn n_derived(&self) -> usize {
        self.derived_names().len()
    }

    /// Total measurement count across all inputs.
    fn n_measurements(&self) -> usize {
        (0..self.n_inputs()).map(|i| self.input_size(i)).sum()
    }

    /// Solver scaling; defaults to power-of-two factors from the bounds.
    fn scaling(&self) -> FitResult<Scaling> {
        Scaling::from_bounds(self.bounds_lo().view(), self.bounds_hi().view())
    }

    /// Check vector lengths and `lo <= start <= hi`.
    fn validate(&self) -> FitResult<()> {
        validate_model(self)
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn varying_names(&self) -> &[&'static str] {
        (**self).varying_names()
    }
    fn fixed_names(&self) -> &[&'static str] {
        (**self).fixed_names()
    }
    fn derived_names(&self) -> &[&'static str] {
        (**self).derived_names()
    }
    fn fixed_defaults(&self) -> Array1<f64> {
        (**self).fixed_defaults()
    }
    fn bounds_lo(&self) -> Array1<f64> {
        (**self).bounds_lo()
    }
    fn bounds_hi(&self) -> Array1<f64> {
        (**self).bounds_hi()
    }
    fn start(&self) -> Array1<f64> {
        (**self).start()
    }
    fn gain_index(&self) -> Option<usize> {
        (**self).gain_index()
    }
    fn n_inputs(&self) -> usize {
        (**self).n_inputs()
    }
    fn input_size(&self, image: usize) -> usize {
        (**self).input_size(image)
    }
    fn signal(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64> {
        (**self).signal(varying, fixed)
    }
    fn jacobian(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Option<Array2<f64>> {
        (**self).jacobian(varying, fixed)
    }
    fn derived(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64> {
        (**self).derived(varying, fixed)
    }
    fn scaling(&self) -> FitResult<Scaling> {
        (**self).scaling()
    }
    fn validate(&self) -> FitResult<()> {
        (**self).validate()
    }
}

/// Shared implementation of [`Model::validate`].
pub fn validate_model<M: Model + ?Sized>(model: &M) -> FitResult<()> {
    let invalid = |reason: String| FitError::InvalidModel { model: model.name().to_string(), reason };
    let nv = model.n_varying();
    let (lo, hi, start) = (model.bounds_lo(), model.bounds_hi(), model.start());
    for (what, len) in [("bounds_lo", lo.len()), ("bounds_hi", hi.len()), ("start", start.len())] {
        if len != nv {
            return Err(invalid(format!("{what} has length {len}, expected {nv}")));
        }
    }
    let nf = model.n_fixed();
    let defaults = model.fixed_defaults().len();
    if defaults != nf {
        return Err(invalid(format!("fixed_defaults has length {defaults}, expected {nf}")));
    }
    if let Some(g) = model.gain_index() {
        if g >= nv {
            return Err(invalid(format!("gain index {g} out of range for {nv} parameters")));
        }
    }
    if model.n_inputs() == 0 {
        return Err(invalid("model has no inputs".to_string()));
    }
    for i in 0..nv {
        if !(lo[i].is_finite() && hi[i].is_finite() && lo[i] <= hi[i]) {
            return Err(invalid(format!(
                "bounds of '{}' are [{}, {}]",
                model.varying_names()[i],
                lo[i],
                hi[i]
            )));
        }
        if !(lo[i]..=hi[i]).contains(&start[i]) {
            return Err(invalid(format!(
                "start of '{}' ({}) lies outside [{}, {}]",
                model.varying_names()[i],
                start[i],
                lo[i],
                hi[i]
            )));
        }
    }
    Ok(())
}

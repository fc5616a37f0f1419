//! rust_qmri — voxelwise quantitative MRI model fitting with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the NIfTI fitting and simulation pipeline to Python via the
//! `_rust_qmri` extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the core modules:
//!   - `optimization`: bounded least-squares solvers (Levenberg–Marquardt,
//!     argmin L-BFGS).
//!   - `inference`: parameter covariance from the Jacobian.
//!   - `fitting`: the model contract, scaled per-voxel fits, sequences,
//!     lineshapes, options and the concrete model catalogue.
//!   - `volume`: geometry, multi-channel volumes, work partitioning and
//!     NIfTI I/O.
//!   - `pipeline`: the region-parallel fit orchestrator and simulation.
//! - With `python-bindings`, define `fit_images` / `simulate_images` and
//!   the `FitReport` class.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs only
//!   FFI glue, option assembly and error mapping.
//! - Python calls release the GIL while the worker pool runs.
//!
//! Conventions
//! -----------
//! - Errors from Rust code are [`FitError`](fitting::errors::FitError)s
//!   internally and become `ValueError` / `IOError` at the PyO3 boundary.
//!
//! Downstream usage
//! ----------------
//! - Rust callers build a model (directly or through
//!   [`build_model`](fitting::models::build_model)), wrap it in a
//!   [`ModelFitFilter`](pipeline::ModelFitFilter) and call `update()`.
//! - Python callers pass file paths and receive a `FitReport`.

pub mod fitting;
pub mod inference;
pub mod optimization;
pub mod pipeline;
pub mod volume;

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "python-bindings")]
use std::{path::PathBuf, str::FromStr};

#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

#[cfg(feature = "python-bindings")]
use crate::{
    fitting::{
        core::{
            lineshape::Lineshape,
            options::{FallbackPolicy, FitOptions, OutputOptions, SimulateOptions},
            sequence::SequenceDoc,
            FitFunction, ScaledFit,
        },
        errors::FitResult,
        models::{build_model, ModelSettings},
    },
    optimization::least_squares::{LmSettings, SolverMethod, SolverOptions, Tolerances},
    pipeline::{simulate_volume, FitSummary, ModelFitFilter},
    volume::{read_volume, write_volume, Region},
};

/// FitReport — Python-facing summary of a completed `fit_images` call.
///
/// Fields
/// ------
/// - `inner`: [`FitSummary`] of the run.
/// - `files`: paths of the written output channels.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_qmri")]
pub struct FitReport {
    inner: FitSummary,
    files: Vec<String>,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl FitReport {
    #[getter]
    pub fn n_voxels(&self) -> usize {
        self.inner.n_voxels
    }

    #[getter]
    pub fn processed(&self) -> usize {
        self.inner.processed
    }

    #[getter]
    pub fn converged(&self) -> usize {
        self.inner.converged
    }

    #[getter]
    pub fn failed(&self) -> usize {
        self.inner.failed
    }

    #[getter]
    pub fn skipped(&self) -> usize {
        self.inner.skipped
    }

    #[getter]
    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    #[getter]
    pub fn files(&self) -> Vec<String> {
        self.files.clone()
    }

    /// `(index, reason)` of the first failed voxel, if any.
    #[getter]
    pub fn first_failure(&self) -> Option<([usize; 3], String)> {
        self.inner.first_failure.as_ref().map(|(index, reason)| (*index, reason.to_string()))
    }
}

#[cfg(feature = "python-bindings")]
fn model_settings(lineshape: &str, r1_b: f64) -> FitResult<ModelSettings> {
    ModelSettings::new(Lineshape::from_arg(lineshape)?, r1_b)
}

#[cfg(feature = "python-bindings")]
fn solver_options(solver: &str, max_iter: Option<usize>) -> FitResult<SolverOptions> {
    let defaults = Tolerances::default();
    let tols = Tolerances::new(defaults.tol_grad, defaults.tol_cost, max_iter.or(defaults.max_iter))?;
    Ok(SolverOptions::new(SolverMethod::from_str(solver)?, tols, LmSettings::default(), None, false)?)
}

/// `(start, size)` voxel box from Python into a [`Region`].
#[cfg(feature = "python-bindings")]
fn subregion_arg(subregion: Option<([usize; 3], [usize; 3])>) -> Option<Region> {
    subregion.map(|(start, size)| Region::new(start, size))
}

/// Fit `model` to NIfTI inputs and write one file per output channel.
///
/// `sequence` is the path of a JSON sequence document; outputs are written
/// as `<out_prefix><channel><extension>`. `subregion` is a `(start, size)`
/// voxel box; `fallback` is `"start"` or `"zero"`.
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(signature = (
    model, sequence, inputs, out_prefix, fixed = None, mask = None, lineshape = "gaussian",
    r1_b = 2.5, solver = "lm", max_iter = None, covariance = false, all_resids = false,
    threads = None, subregion = None, fallback = "start", extension = ".nii.gz"
))]
#[allow(clippy::too_many_arguments)]
pub fn fit_images(
    py: Python<'_>, model: &str, sequence: PathBuf, inputs: Vec<String>, out_prefix: String,
    fixed: Option<Vec<Option<String>>>, mask: Option<String>, lineshape: &str, r1_b: f64,
    solver: &str, max_iter: Option<usize>, covariance: bool, all_resids: bool,
    threads: Option<usize>, subregion: Option<([usize; 3], [usize; 3])>, fallback: &str,
    extension: &str,
) -> PyResult<FitReport> {
    let doc = SequenceDoc::from_path(&sequence)?;
    let model = build_model(model, &doc, &model_settings(lineshape, r1_b)?)?;
    let options = FitOptions::new(
        solver_options(solver, max_iter)?,
        covariance,
        all_resids,
        threads,
        subregion_arg(subregion),
        FallbackPolicy::from_str(fallback)?,
        fitting::core::options::DEFAULT_LINES_PER_REGION,
    )?;
    let output = OutputOptions::new(extension)?;
    let fixed = fixed.unwrap_or_default();

    let (summary, files) = py.allow_threads(move || -> FitResult<(FitSummary, Vec<PathBuf>)> {
        let fit_fn = ScaledFit::new(model, &options)?;
        log::info!("fit_images: model '{}'", fit_fn.model().name());
        let mut filter = ModelFitFilter::new(fit_fn, options);
        filter.read_inputs(&inputs, &fixed, mask)?;
        filter.update()?;
        let files = filter.write_outputs(&out_prefix, &output)?;
        Ok((filter.summary()?.clone(), files))
    })?;
    Ok(FitReport { inner: summary, files: files.iter().map(|p| p.display().to_string()).collect() })
}

/// Simulate `model` from parameter maps and write one file per model input
/// as `<out_prefix><i><extension>`. Returns the written paths.
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(signature = (
    model, sequence, params, out_prefix, fixed = None, mask = None, lineshape = "gaussian",
    r1_b = 2.5, noise_sd = 0.0, seed = 0, threads = None, subregion = None, extension = ".nii.gz"
))]
#[allow(clippy::too_many_arguments)]
pub fn simulate_images(
    py: Python<'_>, model: &str, sequence: PathBuf, params: Vec<String>, out_prefix: String,
    fixed: Option<Vec<Option<String>>>, mask: Option<String>, lineshape: &str, r1_b: f64,
    noise_sd: f64, seed: u64, threads: Option<usize>, subregion: Option<([usize; 3], [usize; 3])>,
    extension: &str,
) -> PyResult<Vec<String>> {
    let doc = SequenceDoc::from_path(&sequence)?;
    let model = build_model(model, &doc, &model_settings(lineshape, r1_b)?)?;
    let options = SimulateOptions::new(noise_sd, seed, threads, subregion_arg(subregion))?;
    let output = OutputOptions::new(extension)?;
    let fixed = fixed.unwrap_or_default();

    let files = py.allow_threads(move || -> FitResult<Vec<PathBuf>> {
        let params = params.iter().map(read_volume).collect::<FitResult<Vec<_>>>()?;
        let fixed = fixed
            .iter()
            .map(|p| p.as_ref().map(read_volume).transpose())
            .collect::<FitResult<Vec<_>>>()?;
        let mask = mask.map(read_volume).transpose()?;
        let volumes = simulate_volume(model.as_ref(), &params, &fixed, mask.as_ref(), &options)?;
        volumes
            .iter()
            .enumerate()
            .map(|(i, volume)| {
                let path = PathBuf::from(format!("{out_prefix}{i}{}", output.extension));
                write_volume(&path, volume)?;
                Ok(path)
            })
            .collect()
    })?;
    Ok(files.iter().map(|p| p.display().to_string()).collect())
}

/// _rust_qmri — PyO3 module initializer for the Python extension.
///
/// Registers `fit_images`, `simulate_images`, the `FitReport` class and
/// the `__version__` attribute.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_qmri<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(fit_images, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_images, m)?)?;
    m.add_class::<FitReport>()?;
    m.add("__version__", VERSION)?;
    Ok(())
}

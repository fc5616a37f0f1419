//! Fit options — configuration for fitting, simulation and output writing.
//!
//! Purpose
//! -------
//! Collect the knobs of a voxelwise run in validated structs so call sites
//! pass explicit configuration instead of loose flags: solver settings,
//! optional output channels, parallelism, spatial restriction, the fallback
//! policy for failed voxels, and the output file extension.
//!
//! Key behaviors
//! -------------
//! - [`FitOptions`] configures `ModelFitFilter` runs and `ScaledFit`.
//! - [`SimulateOptions`] configures forward simulation (noise level, seed).
//! - [`OutputOptions`] configures `write_outputs`.
//! - Every struct has a `Default` and a fallible `new` that rejects
//!   out-of-range values with `FitError::InvalidOption` /
//!   `FitError::InvalidThreads` / `FitError::InvalidNoise`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `threads`, when set, is at least 1; `None` means "use the available
//!   hardware parallelism".
//! - `lines_per_region >= 1`. The region partition depends on this value
//!   and the volume shape only, so results never depend on `threads`.
//! - Subregions are validated against the volume at `update()` time, not
//!   here, because the volume shape is not yet known.
//!
//! Conventions
//! -----------
//! - Solver settings are the optimization layer's own [`SolverOptions`],
//!   validated by their constructors.
//!
//! Testing notes
//! -------------
//! - Unit tests check defaults and each rejection path.
use crate::{
    fitting::errors::{FitError, FitResult},
    optimization::least_squares::SolverOptions,
    volume::region::Region,
};
use std::str::FromStr;

/// Default number of whole x-lines per work region.
pub const DEFAULT_LINES_PER_REGION: usize = 1;

/// Output file extension used when none is configured.
pub const DEFAULT_EXTENSION: &str = ".nii.gz";

/// What a failed voxel reports for its varying parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// The model's start values.
    #[default]
    Start,
    /// Zeros.
    Zero,
}

/// Case-insensitive `"start"` or `"zero"`.
impl FromStr for FallbackPolicy {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(FallbackPolicy::Start),
            "zero" => Ok(FallbackPolicy::Zero),
            _ => Err(FitError::InvalidOption { name: "fallback", reason: "expected 'start' or 'zero'" }),
        }
    }
}

/// Configuration of a fitting run.
///
/// Fields
/// ------
/// - `solver`: back-end, tolerances and iteration cap.
/// - `covariance`: also estimate parameter covariances (`COV` channel).
/// - `all_resids`: also write the full residual vector (`all_resids`).
/// - `threads`: worker count; `None` uses the available parallelism.
/// - `subregion`: restrict fitting to a box; voxels outside keep 0.
/// - `fallback`: varying values reported by failed voxels.
/// - `lines_per_region`: x-lines per scheduled work unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub solver: SolverOptions,
    pub covariance: bool,
    pub all_resids: bool,
    pub threads: Option<usize>,
    pub subregion: Option<Region>,
    pub fallback: FallbackPolicy,
    pub lines_per_region: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            solver: SolverOptions::default(),
            covariance: false,
            all_resids: false,
            threads: None,
            subregion: None,
            fallback: FallbackPolicy::default(),
            lines_per_region: DEFAULT_LINES_PER_REGION,
        }
    }
}

impl FitOptions {
    /// Validated constructor.
    ///
    /// # Errors
    /// - `FitError::InvalidThreads` when `threads == Some(0)`.
    /// - `FitError::InvalidOption` when `lines_per_region == 0`.
    pub fn new(
        solver: SolverOptions, covariance: bool, all_resids: bool, threads: Option<usize>,
        subregion: Option<Region>, fallback: FallbackPolicy, lines_per_region: usize,
    ) -> FitResult<Self> {
        validate_threads(threads)?;
        if lines_per_region == 0 {
            return Err(FitError::InvalidOption {
                name: "lines_per_region",
                reason: "must be at least 1",
            });
        }
        Ok(Self { solver, covariance, all_resids, threads, subregion, fallback, lines_per_region })
    }

    /// Worker count after resolving `None`.
    pub fn resolved_threads(&self) -> usize {
        resolve_threads(self.threads)
    }
}

/// Configuration of a forward simulation.
///
/// - `noise_sd`: standard deviation of additive Gaussian noise (0 = none).
/// - `seed`: base seed; voxel `i` draws from a generator seeded with
///   `seed + i`, so noise is independent of the thread count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulateOptions {
    pub noise_sd: f64,
    pub seed: u64,
    pub threads: Option<usize>,
    pub subregion: Option<Region>,
}

impl SimulateOptions {
    /// # Errors
    /// - `FitError::InvalidNoise` for negative or non-finite `noise_sd`.
    /// - `FitError::InvalidThreads` when `threads == Some(0)`.
    pub fn new(
        noise_sd: f64, seed: u64, threads: Option<usize>, subregion: Option<Region>,
    ) -> FitResult<Self> {
        if !(noise_sd.is_finite() && noise_sd >= 0.0) {
            return Err(FitError::InvalidNoise { value: noise_sd });
        }
        validate_threads(threads)?;
        Ok(Self { noise_sd, seed, threads, subregion })
    }

    pub fn resolved_threads(&self) -> usize {
        resolve_threads(self.threads)
    }
}

/// Configuration of `write_outputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub extension: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { extension: DEFAULT_EXTENSION.to_string() }
    }
}

impl OutputOptions {
    /// # Errors
    /// `FitError::InvalidOption` unless `extension` is `.nii` or `.nii.gz`.
    pub fn new(extension: &str) -> FitResult<Self> {
        match extension {
            ".nii" | ".nii.gz" => Ok(Self { extension: extension.to_string() }),
            _ => Err(FitError::InvalidOption {
                name: "extension",
                reason: "must be \".nii\" or \".nii.gz\"",
            }),
        }
    }
}

fn validate_threads(threads: Option<usize>) -> FitResult<()> {
    match threads {
        Some(0) => Err(FitError::InvalidThreads { threads: 0 }),
        _ => Ok(()),
    }
}

fn resolve_threads(threads: Option<usize>) -> usize {
    threads.unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

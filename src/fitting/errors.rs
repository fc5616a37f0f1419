//! Errors for the voxelwise fitting engine (configuration, geometry, I/O
//! and orchestration).
//!
//! This module defines [`FitError`], the fatal error type of the pipeline.
//! Per-voxel problems are **not** errors: they are recorded as
//! `FailureReason`s inside each voxel's fit result and never abort a run.
//!
//! ## Conventions
//! - **Indices are 0-based**; image indices follow the order of the input
//!   list, fixed-parameter indices follow `Model::fixed_names`.
//! - I/O failures carry the offending path and the underlying message so
//!   the error stays `Clone + PartialEq`.
//! - With the `python-bindings` feature, `FitError` converts into a Python
//!   `ValueError` (configuration) or `IOError` (I/O).
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::{PyIOError, PyValueError};
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

use crate::optimization::errors::OptError;

/// Crate-wide result alias for fitting operations that may produce [`FitError`].
pub type FitResult<T> = Result<T, FitError>;

#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    // ---- Inputs ----
    /// Number of input images differs from the model's input count.
    InputCountMismatch { expected: usize, found: usize },

    /// An input image's channel depth differs from the sequence size.
    ChannelCountMismatch { input: usize, expected: usize, found: usize },

    /// More fixed-parameter maps than the model has fixed parameters.
    FixedCountMismatch { expected: usize, found: usize },

    /// Fixed-parameter maps and masks must be single-channel.
    NotScalarVolume { what: String, depth: usize },

    /// A volume does not share the reference geometry.
    GeometryMismatch { what: String, reason: String },

    /// Volume data shape disagrees with its geometry.
    VolumeShapeMismatch { expected: [usize; 3], found: [usize; 3] },

    // ---- Model / scaling ----
    /// Model definition is internally inconsistent.
    InvalidModel { model: String, reason: String },

    /// `Model::signal` length differs from the summed input sizes.
    SignalLengthMismatch { model: String, expected: usize, found: usize },

    /// Scaling vector length differs from the parameter count.
    ScalingLengthMismatch { expected: usize, found: usize },

    /// Scale factors must be finite and strictly positive.
    InvalidScaling { index: usize, value: f64 },

    /// Model name not present in the registry.
    UnknownModel { name: String },

    /// Lineshape name is neither built in nor a readable table.
    UnknownLineshape { name: String },

    // ---- Configuration ----
    /// Sequence document is malformed or inconsistent.
    InvalidSequence { reason: String },

    /// Subregion is empty or extends outside the volume.
    InvalidSubregion { reason: String },

    /// Thread count must be at least one.
    InvalidThreads { threads: usize },

    /// Worker pool could not be created.
    ThreadPool { reason: String },

    /// Option value out of range.
    InvalidOption { name: &'static str, reason: &'static str },

    /// Noise standard deviation must be finite and non-negative.
    InvalidNoise { value: f64 },

    // ---- Orchestration ----
    /// No inputs were provided before `update`.
    MissingInputs,

    /// Outputs were requested before `update` completed.
    NotUpdated,

    /// Output channel name not present.
    UnknownChannel { name: String },

    // ---- I/O ----
    /// File-system failure.
    Io { path: String, reason: String },

    /// NIfTI decoding/encoding failure.
    Nifti { path: String, reason: String },

    // ---- Solver configuration ----
    /// Solver options rejected at configuration time.
    Optimization(OptError),
}

impl std::error::Error for FitError {}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Inputs ----
            FitError::InputCountMismatch { expected, found } => {
                write!(f, "Model expects {expected} input images, found {found}")
            }
            FitError::ChannelCountMismatch { input, expected, found } => {
                write!(
                    f,
                    "Input image {input} has {found} channels but the sequence describes {expected}"
                )
            }
            FitError::FixedCountMismatch { expected, found } => {
                write!(f, "Model has {expected} fixed parameters, {found} maps were given")
            }
            FitError::NotScalarVolume { what, depth } => {
                write!(f, "{what} must have a single channel, found {depth}")
            }
            FitError::GeometryMismatch { what, reason } => {
                write!(f, "Geometry of {what} does not match the reference: {reason}")
            }
            FitError::VolumeShapeMismatch { expected, found } => {
                write!(f, "Volume data shape {found:?} does not match geometry {expected:?}")
            }

            // ---- Model / scaling ----
            FitError::InvalidModel { model, reason } => {
                write!(f, "Invalid model '{model}': {reason}")
            }
            FitError::SignalLengthMismatch { model, expected, found } => {
                write!(f, "Model '{model}' produced {found} signal values, expected {expected}")
            }
            FitError::ScalingLengthMismatch { expected, found } => {
                write!(f, "Scaling length mismatch: expected {expected}, found {found}")
            }
            FitError::InvalidScaling { index, value } => {
                write!(f, "Invalid scale factor at index {index}: {value}, must be finite and > 0")
            }
            FitError::UnknownModel { name } => {
                write!(f, "Unknown model '{name}'")
            }
            FitError::UnknownLineshape { name } => {
                write!(f, "Unknown lineshape '{name}'")
            }

            // ---- Configuration ----
            FitError::InvalidSequence { reason } => {
                write!(f, "Invalid sequence description: {reason}")
            }
            FitError::InvalidSubregion { reason } => {
                write!(f, "Invalid subregion: {reason}")
            }
            FitError::InvalidThreads { threads } => {
                write!(f, "Invalid thread count {threads}, must be at least 1")
            }
            FitError::ThreadPool { reason } => {
                write!(f, "Failed to build worker pool: {reason}")
            }
            FitError::InvalidOption { name, reason } => {
                write!(f, "Invalid option '{name}': {reason}")
            }
            FitError::InvalidNoise { value } => {
                write!(f, "Invalid noise level {value}, must be finite and >= 0")
            }

            // ---- Orchestration ----
            FitError::MissingInputs => {
                write!(f, "No input images were provided")
            }
            FitError::NotUpdated => {
                write!(f, "Outputs requested before update() completed")
            }
            FitError::UnknownChannel { name } => {
                write!(f, "No output channel named '{name}'")
            }

            // ---- I/O ----
            FitError::Io { path, reason } => {
                write!(f, "I/O error on '{path}': {reason}")
            }
            FitError::Nifti { path, reason } => {
                write!(f, "NIfTI error on '{path}': {reason}")
            }

            // ---- Solver configuration ----
            FitError::Optimization(err) => {
                write!(f, "Solver configuration error: {err}")
            }
        }
    }
}

impl From<OptError> for FitError {
    fn from(err: OptError) -> Self {
        FitError::Optimization(err)
    }
}

impl From<serde_json::Error> for FitError {
    fn from(err: serde_json::Error) -> Self {
        FitError::InvalidSequence { reason: err.to_string() }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<FitError> for PyErr {
    fn from(err: FitError) -> PyErr {
        match err {
            FitError::Io { .. } | FitError::Nifti { .. } => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

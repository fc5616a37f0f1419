//! fitting::core — the voxelwise fitting contract and its building blocks.
//!
//! Purpose
//! -------
//! Collect the pieces every model fit is assembled from: the [`Model`]
//! trait, per-voxel inputs, scaled parameterisation, the [`FitFunction`]
//! contract with its default [`ScaledFit`] implementation, sequence
//! descriptions, lineshapes and run options.
//!
//! Key behaviors
//! -------------
//! - [`model`] defines what a signal model must provide.
//! - [`scaling`] maps parameters to O(1) solver coordinates and back.
//! - [`fit_function`] turns one voxel into one fit result, never failing.
//! - [`sequence`] and [`lineshape`] describe the acquisitions and the bound
//!   pool absorption used by concrete models.
//! - [`options`] holds validated run configuration.
//!
//! Invariants & assumptions
//! ------------------------
//! - Everything here is shared read-only across worker threads.
//! - Nothing in this module logs.

pub mod fit_function;
pub mod lineshape;
pub mod model;
pub mod options;
pub mod scaling;
pub mod sequence;
pub mod voxel;

pub use self::fit_function::{FailureReason, FitFunction, FitStatus, ScaledFit, VoxelFit};
pub use self::lineshape::{InterpLineshape, Lineshape};
pub use self::model::Model;
pub use self::options::{FallbackPolicy, FitOptions, OutputOptions, SimulateOptions};
pub use self::scaling::Scaling;
pub use self::sequence::{
    MtSatSequence, MultiEchoSequence, Sequence, SequenceDoc, SpgrEchoSequence, SpgrSequence,
};
pub use self::voxel::VoxelInput;

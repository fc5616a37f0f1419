//! fitting — models, per-voxel fit functions and their configuration.
//!
//! - [`core`]: the model/fit-function contract, scaling, sequences,
//!   lineshapes and options.
//! - [`models`]: the concrete model catalogue and the name registry.
//! - [`errors`]: [`FitError`](errors::FitError), the fatal error type of
//!   the whole pipeline.

pub mod core;
pub mod errors;
pub mod models;

// ---- Optional convenience prelude for downstream crates -------------------
//
//     use rust_qmri::fitting::prelude::*;

pub mod prelude {
    pub use super::core::{
        FallbackPolicy, FitFunction, FitOptions, Lineshape, Model, OutputOptions, ScaledFit,
        SequenceDoc, SimulateOptions, VoxelFit, VoxelInput,
    };
    pub use super::errors::{FitError, FitResult};
    pub use super::models::{build_model, ModelSettings};
}

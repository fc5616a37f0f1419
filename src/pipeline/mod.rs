//! pipeline — volume-level orchestration of voxelwise fits and simulations.
//!
//! Purpose
//! -------
//! Turn a per-voxel [`FitFunction`](crate::fitting::core::FitFunction) into
//! a whole-volume operation: validate inputs, partition the volume, run the
//! voxels on a bounded worker pool and gather multi-channel outputs.
//!
//! Key behaviors
//! -------------
//! - [`filter`]: [`ModelFitFilter`], the fit orchestrator, and its
//!   [`FitSummary`].
//! - [`simulate`]: [`simulate_volume`], forward evaluation of a model over
//!   parameter maps with optional seeded noise.
//! - [`outputs`]: per-channel `(n_voxels, depth)` buffers and the disjoint
//!   per-region writers.
//! - [`scheduler`]: pool construction, row-block splitting, region
//!   execution and voxel selection.
//!
//! Invariants & assumptions
//! ------------------------
//! - Results never depend on the thread count.
//! - Only configuration and I/O problems are fatal; voxel failures are
//!   recorded and the run continues.
//!
//! Conventions
//! -----------
//! - This is the only layer that logs (through the `log` facade).

pub mod filter;
pub mod outputs;
pub mod scheduler;
pub mod simulate;

pub use self::filter::{FitSummary, ModelFitFilter};
pub use self::outputs::{ChannelKind, OutputChannel, OutputVolumeSet, RegionWriter};
pub use self::scheduler::RegionTally;
pub use self::simulate::simulate_volume;

// ---- Optional convenience prelude for downstream crates -------------------
//
//     use rust_qmri::pipeline::prelude::*;

pub mod prelude {
    pub use super::filter::{FitSummary, ModelFitFilter};
    pub use super::outputs::OutputVolumeSet;
    pub use super::simulate::simulate_volume;
}

//! volume — voxel grids, geometry, work partitioning and NIfTI I/O.
//!
//! Purpose
//! -------
//! Hold the image-side collaborators of the fitting pipeline: multi-channel
//! [`Volume`]s with their [`Geometry`], the [`Region`] used to restrict a
//! run, the [`WorkRegion`] partition the scheduler distributes, and NIfTI
//! reading/writing.
//!
//! Conventions
//! -----------
//! - Indices are `[x, y, z]`, raster order is x-fastest.
//! - Geometry is taken from the first input and propagated unchanged.
//! - This module never logs.

pub mod geometry;
pub mod image;
pub mod nifti_io;
pub mod region;

pub use self::geometry::Geometry;
pub use self::image::Volume;
pub use self::nifti_io::{read_volume, write_volume};
pub use self::region::{partition, Region, WorkRegion};

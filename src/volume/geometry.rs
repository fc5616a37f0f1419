//! Spatial geometry of a 3-D voxel grid.
//!
//! A [`Geometry`] records the grid size, voxel spacing, world-space origin
//! and direction cosines of an image. It is read from the first input,
//! compared against every other input, and copied unchanged onto every
//! output.
//!
//! ## Conventions
//! - Voxel indices are `[x, y, z]`; the linear (raster) index is
//!   `x + nx·(y + ny·z)`, x fastest.
//! - `direction[r][c]` is row `r`, column `c` of the rotation; column `c` is
//!   the world direction of voxel axis `c`.
//! - Geometries compare equal within [`GEOMETRY_TOLERANCE`] (absolute, in
//!   world units), matching the precision NIfTI stores them with.
use crate::fitting::errors::{FitError, FitResult};

/// Absolute tolerance used when comparing spacing, origin and direction.
pub const GEOMETRY_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub direction: [[f64; 3]; 3],
}

impl Geometry {
    /// Unit spacing, zero origin, identity direction.
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            dims,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_direction(mut self, direction: [[f64; 3]; 3]) -> Self {
        self.direction = direction;
        self
    }

    /// Decompose a voxel-to-world affine into spacing, direction and origin.
    ///
    /// Columns with zero length keep unit spacing and the identity column.
    pub fn from_affine(dims: [usize; 3], affine: &[[f64; 4]; 4]) -> Self {
        let mut geometry = Self::new(dims);
        for c in 0..3 {
            let norm = (0..3).map(|r| affine[r][c] * affine[r][c]).sum::<f64>().sqrt();
            if norm > 0.0 && norm.is_finite() {
                geometry.spacing[c] = norm;
                for r in 0..3 {
                    geometry.direction[r][c] = affine[r][c] / norm;
                }
            }
        }
        for r in 0..3 {
            geometry.origin[r] = affine[r][3];
        }
        geometry
    }

    /// `direction · diag(spacing)` with the origin in the last column.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        let mut out = [[0.0; 4]; 4];
        for r in 0..3 {
            for c in 0..3 {
                out[r][c] = self.direction[r][c] * self.spacing[c];
            }
            out[r][3] = self.origin[r];
        }
        out[3][3] = 1.0;
        out
    }

    pub fn n_voxels(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of x-lines, `ny·nz`.
    pub fn n_lines(&self) -> usize {
        self.dims[1] * self.dims[2]
    }

    pub fn linear_index(&self, index: [usize; 3]) -> usize {
        let [nx, ny, _] = self.dims;
        index[0] + nx * (index[1] + ny * index[2])
    }

    pub fn voxel_index(&self, linear: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [linear % nx, (linear / nx) % ny, linear / (nx * ny)]
    }

    /// `Ok(())` when `other` describes the same grid, a `GeometryMismatch`
    /// naming `what` otherwise.
    pub fn check_matches(&self, other: &Geometry, what: &str) -> FitResult<()> {
        let mismatch = |reason: String| FitError::GeometryMismatch { what: what.to_string(), reason };
        if self.dims != other.dims {
            return Err(mismatch(format!("dims {:?} vs {:?}", other.dims, self.dims)));
        }
        let close = |a: &[f64], b: &[f64]| a.iter().zip(b).all(|(x, y)| (x - y).abs() <= GEOMETRY_TOLERANCE);
        if !close(&self.spacing, &other.spacing) {
            return Err(mismatch(format!("spacing {:?} vs {:?}", other.spacing, self.spacing)));
        }
        if !close(&self.origin, &other.origin) {
            return Err(mismatch(format!("origin {:?} vs {:?}", other.origin, self.origin)));
        }
        if !self.direction.iter().zip(&other.direction).all(|(a, b)| close(a, b)) {
            return Err(mismatch("direction cosines differ".to_string()));
        }
        Ok(())
    }
}

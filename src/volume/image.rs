//! Multi-channel volumes.
//!
//! A [`Volume`] stores an `(nx, ny, nz, channels)` array together with its
//! [`Geometry`]. Scalar maps (fixed parameters, masks, single output
//! channels) are volumes with one channel.
use crate::{
    fitting::errors::{FitError, FitResult},
    volume::geometry::Geometry,
};
use ndarray::{Array2, Array4, ArrayView1, ArrayView4, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array4<f64>,
    geometry: Geometry,
}

impl Volume {
    /// # Errors
    /// `FitError::VolumeShapeMismatch` when the spatial shape of `data`
    /// differs from `geometry.dims`.
    pub fn new(data: Array4<f64>, geometry: Geometry) -> FitResult<Self> {
        let (nx, ny, nz, _) = data.dim();
        if [nx, ny, nz] != geometry.dims {
            return Err(FitError::VolumeShapeMismatch { expected: geometry.dims, found: [nx, ny, nz] });
        }
        Ok(Self { data, geometry })
    }

    pub fn zeros(geometry: Geometry, depth: usize) -> Self {
        let [nx, ny, nz] = geometry.dims;
        Self { data: Array4::zeros((nx, ny, nz, depth)), geometry }
    }

    /// Volume from a raster-ordered `(n_voxels, depth)` buffer.
    ///
    /// # Errors
    /// `FitError::VolumeShapeMismatch` when the row count differs from the
    /// voxel count of `geometry`.
    pub fn from_rows(rows: &Array2<f64>, geometry: Geometry) -> FitResult<Self> {
        if rows.nrows() != geometry.n_voxels() {
            return Err(FitError::VolumeShapeMismatch {
                expected: geometry.dims,
                found: [rows.nrows(), 1, 1],
            });
        }
        let [nx, ny, nz] = geometry.dims;
        let data = Array4::from_shape_fn((nx, ny, nz, rows.ncols()), |(x, y, z, c)| {
            rows[[geometry.linear_index([x, y, z]), c]]
        });
        Ok(Self { data, geometry })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn dims(&self) -> [usize; 3] {
        self.geometry.dims
    }

    /// Number of channels.
    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn data(&self) -> ArrayView4<'_, f64> {
        self.data.view()
    }

    /// All channels at one voxel.
    pub fn voxel(&self, index: [usize; 3]) -> ArrayView1<'_, f64> {
        let [x, y, z] = index;
        self.data.slice(ndarray::s![x, y, z, ..])
    }

    /// First channel at one voxel.
    pub fn scalar(&self, index: [usize; 3]) -> f64 {
        let [x, y, z] = index;
        self.data[[x, y, z, 0]]
    }

    /// Single-channel copy of channel `channel`.
    pub fn channel(&self, channel: usize) -> Volume {
        let data = self.data.slice(ndarray::s![.., .., .., channel..channel + 1]).to_owned();
        Volume { data, geometry: self.geometry.clone() }
    }

    /// `FitError::NotScalarVolume` unless the volume has one channel.
    pub fn require_scalar(&self, what: &str) -> FitResult<()> {
        if self.depth() != 1 {
            return Err(FitError::NotScalarVolume { what: what.to_string(), depth: self.depth() });
        }
        Ok(())
    }
}

//! Per-voxel input bundle.
//!
//! A [`VoxelInput`] carries everything one independent fit needs: the
//! measurement vector of every input image at that location, the fixed
//! parameter values (from maps or model defaults), the voxel's index and a
//! validity flag set from the mask and subregion. Invalid bundles carry no
//! data and are skipped by the pipeline. Bundles are built lazily by the scheduler and dropped as
//! soon as the voxel is written.
use ndarray::Array1;

/// Measurements and fixed parameters for a single voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelInput {
    /// `[x, y, z]` location in the volume.
    pub index: [usize; 3],
    /// One measurement vector per input image, in input order.
    pub inputs: Vec<Array1<f64>>,
    /// Fixed-parameter values, ordered like `Model::fixed_names`.
    pub fixed: Array1<f64>,
    /// `false` when the mask or subregion excludes the voxel.
    pub valid: bool,
}

impl VoxelInput {
    pub fn new(index: [usize; 3], inputs: Vec<Array1<f64>>, fixed: Array1<f64>) -> Self {
        Self { index, inputs, fixed, valid: true }
    }

    /// Bundle for a voxel outside the mask or subregion.
    pub fn excluded(index: [usize; 3]) -> Self {
        Self { index, inputs: Vec::new(), fixed: Array1::zeros(0), valid: false }
    }

    /// Total number of measurements across all input images.
    pub fn n_measurements(&self) -> usize {
        self.inputs.iter().map(|v| v.len()).sum()
    }

    /// All measurements concatenated in input order.
    pub fn measurements(&self) -> Array1<f64> {
        let mut out = Vec::with_capacity(self.n_measurements());
        for input in &self.inputs {
            out.extend(input.iter().copied());
        }
        Array1::from(out)
    }
}

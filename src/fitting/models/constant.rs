//! Constant signal: every measurement equals `S`.
//!
//! Useful as a minimal end-to-end model: it has one varying parameter, a
//! linear signal and an exact analytic Jacobian.
use crate::fitting::core::model::Model;
use ndarray::{array, Array1, Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantModel {
    size: usize,
}

impl ConstantModel {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Model for ConstantModel {
    fn name(&self) -> &str {
        "constant"
    }

    fn varying_names(&self) -> &[&'static str] {
        &["S"]
    }

    fn fixed_names(&self) -> &[&'static str] {
        &[]
    }

    fn derived_names(&self) -> &[&'static str] {
        &[]
    }

    fn fixed_defaults(&self) -> Array1<f64> {
        Array1::zeros(0)
    }

    fn bounds_lo(&self) -> Array1<f64> {
        array![0.0]
    }

    fn bounds_hi(&self) -> Array1<f64> {
        array![10.0]
    }

    fn start(&self) -> Array1<f64> {
        array![1.0]
    }

    fn gain_index(&self) -> Option<usize> {
        Some(0)
    }

    fn n_inputs(&self) -> usize {
        1
    }

    fn input_size(&self, _image: usize) -> usize {
        self.size
    }

    fn signal(&self, varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_elem(self.size, varying[0])
    }

    fn jacobian(&self, _varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Option<Array2<f64>> {
        Some(Array2::ones((self.size, 1)))
    }
}

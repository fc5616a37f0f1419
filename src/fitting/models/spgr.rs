//! Variable-flip-angle T1 mapping (DESPOT1) from spoiled gradient echoes.
//!
//! Signal at flip angle `α`, with B1 scaling the nominal angle:
//!
//! `S(α) = PD·sin(B1·α)·(1 − E1) / (1 − cos(B1·α)·E1)`, `E1 = exp(−TR/T1)`.
//!
//! `PD` is the gain parameter; the analytic Jacobian is exact.
use crate::fitting::core::{model::Model, sequence::SpgrSequence};
use ndarray::{array, Array1, Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
pub struct SpgrModel {
    tr: f64,
    flip_angles: Vec<f64>,
}

impl SpgrModel {
    pub fn new(sequence: &SpgrSequence) -> Self {
        Self { tr: sequence.tr, flip_angles: sequence.flip_angles_rad().collect() }
    }
}

impl Model for SpgrModel {
    fn name(&self) -> &str {
        "spgr"
    }

    fn varying_names(&self) -> &[&'static str] {
        &["PD", "T1"]
    }

    fn fixed_names(&self) -> &[&'static str] {
        &["B1"]
    }

    fn derived_names(&self) -> &[&'static str] {
        &["R1"]
    }

    fn fixed_defaults(&self) -> Array1<f64> {
        array![1.0]
    }

    fn bounds_lo(&self) -> Array1<f64> {
        array![1e-3, 1e-3]
    }

    fn bounds_hi(&self) -> Array1<f64> {
        array![100.0, 10.0]
    }

    fn start(&self) -> Array1<f64> {
        array![10.0, 1.0]
    }

    fn gain_index(&self) -> Option<usize> {
        Some(0)
    }

    fn n_inputs(&self) -> usize {
        1
    }

    fn input_size(&self, _image: usize) -> usize {
        self.flip_angles.len()
    }

    fn signal(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64> {
        let (pd, t1, b1) = (varying[0], varying[1], fixed[0]);
        let e1 = (-self.tr / t1).exp();
        self.flip_angles
            .iter()
            .map(|&alpha| {
                let a = b1 * alpha;
                pd * a.sin() * (1.0 - e1) / (1.0 - a.cos() * e1)
            })
            .collect()
    }

    fn jacobian(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Option<Array2<f64>> {
        let (pd, t1, b1) = (varying[0], varying[1], fixed[0]);
        let e1 = (-self.tr / t1).exp();
        let de1_dt1 = e1 * self.tr / (t1 * t1);
        let mut jac = Array2::zeros((self.flip_angles.len(), 2));
        for (i, &alpha) in self.flip_angles.iter().enumerate() {
            let a = b1 * alpha;
            let (s, c) = a.sin_cos();
            let denom = 1.0 - c * e1;
            jac[[i, 0]] = s * (1.0 - e1) / denom;
            jac[[i, 1]] = pd * s * (c - 1.0) / (denom * denom) * de1_dt1;
        }
        Some(jac)
    }

    fn derived(&self, varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Array1<f64> {
        array![1.0 / varying[1]]
    }
}

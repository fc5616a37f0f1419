//! Mono-exponential T2 decay from a multi-echo acquisition.
//!
//! `S(TE) = PD·exp(−TE/T2)`; `PD` is the gain parameter.
use crate::fitting::core::{model::Model, sequence::MultiEchoSequence};
use ndarray::{array, Array1, Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
pub struct MultiEchoModel {
    echo_times: Vec<f64>,
}

impl MultiEchoModel {
    pub fn new(sequence: &MultiEchoSequence) -> Self {
        Self { echo_times: sequence.echo_times.clone() }
    }
}

impl Model for MultiEchoModel {
    fn name(&self) -> &str {
        "multiecho"
    }

    fn varying_names(&self) -> &[&'static str] {
        &["PD", "T2"]
    }

    fn fixed_names(&self) -> &[&'static str] {
        &[]
    }

    fn derived_names(&self) -> &[&'static str] {
        &["R2"]
    }

    fn fixed_defaults(&self) -> Array1<f64> {
        Array1::zeros(0)
    }

    fn bounds_lo(&self) -> Array1<f64> {
        array![1e-3, 1e-3]
    }

    fn bounds_hi(&self) -> Array1<f64> {
        array![100.0, 5.0]
    }

    fn start(&self) -> Array1<f64> {
        array![1.0, 0.05]
    }

    fn gain_index(&self) -> Option<usize> {
        Some(0)
    }

    fn n_inputs(&self) -> usize {
        1
    }

    fn input_size(&self, _image: usize) -> usize {
        self.echo_times.len()
    }

    fn signal(&self, varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Array1<f64> {
        let (pd, t2) = (varying[0], varying[1]);
        self.echo_times.iter().map(|te| pd * (-te / t2).exp()).collect()
    }

    fn jacobian(&self, varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Option<Array2<f64>> {
        let (pd, t2) = (varying[0], varying[1]);
        let mut jac = Array2::zeros((self.echo_times.len(), 2));
        for (i, te) in self.echo_times.iter().enumerate() {
            let e = (-te / t2).exp();
            jac[[i, 0]] = e;
            jac[[i, 1]] = pd * e * te / (t2 * t2);
        }
        Some(jac)
    }

    fn derived(&self, varying: ArrayView1<f64>, _fixed: ArrayView1<f64>) -> Array1<f64> {
        array![1.0 / varying[1]]
    }
}

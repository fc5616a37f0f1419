//! Two-pool quantitative magnetisation transfer (Ramani steady state).
//!
//! Purpose
//! -------
//! Fit the free/bound pool model to an MT-weighted Z-spectrum acquired with
//! off-resonance saturation pulses of varying offset and power.
//!
//! Parameters
//! ----------
//! - Varying: `M0_f` (gain), `f_b` (bound fraction), `T2_b`, `T2_f`, `k`
//!   (exchange rate bound→free, per second).
//! - Fixed: `f0` (off-resonance, Hz), `B1` (relative flip angle), `T1_app`
//!   (observed T1 from a separate map, s).
//! - Derived: `T1_f` (free-pool T1, clamped to `[0, 5]` s) and `k_bf`.
//!
//! Signal
//! ------
//! With `ω = B1·θ/p1·√(p2/(Trf·TR))` (θ the saturation angle in radians),
//! `R_rfb = π·ω²·g(Δ + f0; T2_b)`, `F = f_b/(1 − f_b)`, `k_bf = k·F` and
//! `R1_f = R1_obs − k_bf(R1_b − R1_obs)/(R1_b − R1_obs + k)`:
//!
//! `S = M0_f·(R1_b·k_bf/R1_f + R_rfb + R1_b + k)
//!      / (k_bf/R1_f·(R1_b + R_rfb) + (1 + (ω/(2πΔ))²/(R1_f·T2_f))·(R_rfb + R1_b + k))`.
//!
//! Degenerate combinations (e.g. `R1_f → 0`) yield non-finite signals,
//! which the solver reports and the fit records as a voxel failure. No
//! analytic Jacobian is provided; the solver uses finite differences.
use crate::fitting::core::{lineshape::Lineshape, model::Model, sequence::MtSatSequence};
use ndarray::{array, Array1, ArrayView1};
use std::f64::consts::PI;

/// Default longitudinal relaxation rate of the bound pool (s⁻¹).
pub const DEFAULT_R1_B: f64 = 2.5;

const T1_F_MAX: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct QmtModel {
    sequence: MtSatSequence,
    lineshape: Lineshape,
    r1_b: f64,
}

impl QmtModel {
    pub fn new(sequence: MtSatSequence, lineshape: Lineshape, r1_b: f64) -> Self {
        Self { sequence, lineshape, r1_b }
    }

    pub fn lineshape(&self) -> &Lineshape {
        &self.lineshape
    }

    /// `(k_bf, R1_f)` from `f_b`, `k` and the observed T1.
    fn free_pool_rates(&self, f_b: f64, k: f64, t1_obs: f64) -> (f64, f64) {
        let k_bf = k * f_b / (1.0 - f_b);
        let r1_obs = 1.0 / t1_obs;
        let r1_f = r1_obs - k_bf * (self.r1_b - r1_obs) / (self.r1_b - r1_obs + k);
        (k_bf, r1_f)
    }
}

impl Model for QmtModel {
    fn name(&self) -> &str {
        "qmt"
    }

    fn varying_names(&self) -> &[&'static str] {
        &["M0_f", "f_b", "T2_b", "T2_f", "k"]
    }

    fn fixed_names(&self) -> &[&'static str] {
        &["f0", "B1", "T1_app"]
    }

    fn derived_names(&self) -> &[&'static str] {
        &["T1_f", "k_bf"]
    }

    fn fixed_defaults(&self) -> Array1<f64> {
        array![0.0, 1.0, 1.0]
    }

    fn bounds_lo(&self) -> Array1<f64> {
        array![0.1, 1e-6, 0.1e-6, 0.01, 1.0]
    }

    fn bounds_hi(&self) -> Array1<f64> {
        array![10.0, 0.99, 100e-6, 1.0, 100.0]
    }

    fn start(&self) -> Array1<f64> {
        array![1.0, 0.1, 10e-6, 0.1, 10.0]
    }

    fn gain_index(&self) -> Option<usize> {
        Some(0)
    }

    fn n_inputs(&self) -> usize {
        1
    }

    fn input_size(&self, _image: usize) -> usize {
        self.sequence.sat_f0.len()
    }

    fn signal(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64> {
        let (m0_f, f_b, t2_b, t2_f, k) = (varying[0], varying[1], varying[2], varying[3], varying[4]);
        let (f0, b1, t1_obs) = (fixed[0], fixed[1], fixed[2]);
        let (k_bf, r1_f) = self.free_pool_rates(f_b, k, t1_obs);
        let seq = &self.sequence;
        let pulse_scale = (seq.pulse.p2 / (seq.trf * seq.tr)).sqrt() / seq.pulse.p1;
        let r1_b = self.r1_b;

        seq.sat_f0
            .iter()
            .zip(&seq.sat_angle)
            .map(|(&offset, &angle)| {
                let w = b1 * angle.to_radians() * pulse_scale;
                let r_rfb = PI * w * w * self.lineshape.value(offset + f0, t2_b);
                let direct = (w / (2.0 * PI * offset)).powi(2) / (r1_f * t2_f);
                m0_f * (r1_b * k_bf / r1_f + r_rfb + r1_b + k)
                    / (k_bf / r1_f * (r1_b + r_rfb) + (1.0 + direct) * (r_rfb + r1_b + k))
            })
            .collect()
    }

    fn derived(&self, varying: ArrayView1<f64>, fixed: ArrayView1<f64>) -> Array1<f64> {
        let (k_bf, r1_f) = self.free_pool_rates(varying[1], varying[4], fixed[2]);
        array![(1.0 / r1_f).clamp(0.0, T1_F_MAX), k_bf]
    }
}

//! fitting::core::scaling — scaled parameterization for the solver.
//!
//! Purpose
//! -------
//! Map model parameters in natural units (seconds, fractions, Hz) onto
//! O(1) solver coordinates and back, so a single set of solver tolerances
//! and finite-difference steps works for every model.
//!
//! Key behaviors
//! -------------
//! - [`Scaling::from_bounds`] picks, per parameter, the power of two
//!   nearest to `max(|lo|, |hi|)`. Multiplying or dividing by a power of
//!   two only changes the exponent, so `unscale(scale(x)) == x` exactly.
//! - [`Scaling::scale_jacobian`] and [`Scaling::unscale_covariance`] carry
//!   derivatives and covariances between the two coordinate systems.
//!
//! Invariants & assumptions
//! ------------------------
//! - Factors are finite and strictly positive; constructors enforce it.
//! - Vectors passed in must have one entry per varying parameter; a
//!   mismatch is a configuration error, never a panic.
//!
//! Conventions
//! -----------
//! - `scaled = natural / factor`, `natural = scaled * factor`.
//! - Jacobian columns are indexed by parameter.
//!
//! Testing notes
//! -------------
//! - Unit tests cover exact invertibility over a wide range of magnitudes,
//!   factor selection and the covariance transform.
use crate::fitting::errors::{FitError, FitResult};
use ndarray::{Array1, Array2, ArrayView1, Zip};

#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    factors: Array1<f64>,
}

impl Scaling {
    /// Explicit factors; each must be finite and `> 0`.
    ///
    /// # Errors
    /// `FitError::InvalidScaling` for the first offending factor.
    pub fn new(factors: Array1<f64>) -> FitResult<Self> {
        for (index, &value) in factors.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(FitError::InvalidScaling { index, value });
            }
        }
        Ok(Self { factors })
    }

    /// Power-of-two factors nearest to `max(|lo|, |hi|)`.
    ///
    /// A parameter whose bounds are both zero gets factor 1.
    ///
    /// # Errors
    /// - `FitError::ScalingLengthMismatch` when `lo` and `hi` differ in length.
    /// - `FitError::InvalidScaling` when a bound is non-finite.
    pub fn from_bounds(lo: ArrayView1<f64>, hi: ArrayView1<f64>) -> FitResult<Self> {
        if lo.len() != hi.len() {
            return Err(FitError::ScalingLengthMismatch { expected: lo.len(), found: hi.len() });
        }
        let mut factors = Array1::<f64>::ones(lo.len());
        for (index, (l, h)) in lo.iter().zip(hi.iter()).enumerate() {
            let magnitude = l.abs().max(h.abs());
            if !magnitude.is_finite() {
                return Err(FitError::InvalidScaling { index, value: magnitude });
            }
            if magnitude > 0.0 {
                factors[index] = nearest_power_of_two(magnitude);
            }
        }
        Self::new(factors)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &Array1<f64> {
        &self.factors
    }

    /// Natural → scaled.
    pub fn scale(&self, natural: ArrayView1<f64>) -> FitResult<Array1<f64>> {
        self.check_len(natural.len())?;
        Ok(&natural / &self.factors)
    }

    /// Scaled → natural.
    pub fn unscale(&self, scaled: ArrayView1<f64>) -> FitResult<Array1<f64>> {
        self.check_len(scaled.len())?;
        Ok(&scaled * &self.factors)
    }

    /// Convert `∂r/∂natural` into `∂r/∂scaled` by multiplying column `j` by factor `j`.
    pub fn scale_jacobian(&self, mut jacobian: Array2<f64>) -> FitResult<Array2<f64>> {
        self.check_len(jacobian.ncols())?;
        Zip::from(jacobian.columns_mut()).and(&self.factors).for_each(|mut col, &f| {
            col *= f;
        });
        Ok(jacobian)
    }

    /// `diag(f)·C·diag(f)`: covariance in scaled units → natural units.
    pub fn unscale_covariance(&self, covariance: &Array2<f64>) -> FitResult<Array2<f64>> {
        self.check_len(covariance.nrows())?;
        self.check_len(covariance.ncols())?;
        let f = &self.factors;
        let mut out = covariance.clone();
        for ((i, j), v) in out.indexed_iter_mut() {
            *v *= f[i] * f[j];
        }
        Ok(out)
    }

    fn check_len(&self, found: usize) -> FitResult<()> {
        if found != self.factors.len() {
            return Err(FitError::ScalingLengthMismatch { expected: self.factors.len(), found });
        }
        Ok(())
    }
}

fn nearest_power_of_two(value: f64) -> f64 {
    2.0_f64.powi(value.log2().round() as i32)
}

//! fitting::core::lineshape — absorption lineshapes of the bound proton pool.
//!
//! Purpose
//! -------
//! Evaluate `g(Δ; T2)`, the absorption lineshape at off-resonance `Δ` (Hz)
//! for a pool with transverse relaxation `T2` (s). The qMT model multiplies
//! it into the saturation rate of the bound pool.
//!
//! Key behaviors
//! -------------
//! - Closed-form Gaussian and Lorentzian shapes.
//! - Super-Lorentzian by midpoint quadrature over the orientation cosine;
//!   the magic-angle singularity is never sampled exactly.
//! - Interpolated shapes read from a JSON table (`{"lineshape": {...}}`) and
//!   rescaled from the table's reference `T2b` to the requested `T2`.
//! - [`Lineshape::from_arg`] accepts a built-in name (case-insensitive) or a
//!   path to a table; anything else is `FitError::UnknownLineshape`.
//!
//! Conventions
//! -----------
//! - Lineshapes are even in `Δ`; tables list non-negative offsets only and
//!   are evaluated at `|Δ|`, clamped to the table ends.
use crate::fitting::errors::{FitError, FitResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use std::str::FromStr;

const SUPER_LORENTZIAN_NODES: usize = 2048;
const MAGIC_ANGLE_EPS: f64 = 1e-12;

/// Tabulated lineshape sampled at a reference `T2b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpLineshape {
    #[serde(rename = "T2b")]
    pub t2_ref: f64,
    pub frequencies: Vec<f64>,
    pub values: Vec<f64>,
}

impl InterpLineshape {
    pub fn new(t2_ref: f64, frequencies: Vec<f64>, values: Vec<f64>) -> FitResult<Self> {
        let table = Self { t2_ref, frequencies, values };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> FitResult<()> {
        let bad = |reason: &str| FitError::UnknownLineshape { name: format!("table: {reason}") };
        if !(self.t2_ref.is_finite() && self.t2_ref > 0.0) {
            return Err(bad("T2b must be finite and > 0"));
        }
        if self.frequencies.len() < 2 || self.frequencies.len() != self.values.len() {
            return Err(bad("need at least two frequencies and one value per frequency"));
        }
        if self.frequencies.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(bad("frequencies must be strictly increasing"));
        }
        if self.frequencies.iter().chain(&self.values).any(|v| !v.is_finite()) {
            return Err(bad("non-finite entry"));
        }
        Ok(())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> FitResult<Self> {
        #[derive(Deserialize)]
        struct Wrapper {
            lineshape: InterpLineshape,
        }
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FitError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let wrapper: Wrapper = serde_json::from_str(&text).map_err(|e| FitError::UnknownLineshape {
            name: format!("{}: {e}", path.display()),
        })?;
        wrapper.lineshape.validate()?;
        Ok(wrapper.lineshape)
    }

    /// `g(Δ; T2) = (T2/T2ref)·g_ref(|Δ|·T2/T2ref)`.
    pub fn value(&self, df: f64, t2: f64) -> f64 {
        let ratio = t2 / self.t2_ref;
        let f = df.abs() * ratio;
        let freqs = &self.frequencies;
        let last = freqs.len() - 1;
        let g_ref = if f <= freqs[0] {
            self.values[0]
        } else if f >= freqs[last] {
            self.values[last]
        } else {
            let hi = freqs.partition_point(|&q| q <= f);
            let lo = hi - 1;
            let t = (f - freqs[lo]) / (freqs[hi] - freqs[lo]);
            self.values[lo] + t * (self.values[hi] - self.values[lo])
        };
        ratio * g_ref
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Lineshape {
    #[default]
    Gaussian,
    Lorentzian,
    SuperLorentzian,
    Interpolated(InterpLineshape),
}

impl FromStr for Lineshape {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Ok(Lineshape::Gaussian),
            "lorentzian" => Ok(Lineshape::Lorentzian),
            "superlorentzian" | "super-lorentzian" => Ok(Lineshape::SuperLorentzian),
            _ => Err(FitError::UnknownLineshape { name: s.to_string() }),
        }
    }
}

impl Lineshape {
    /// Built-in name, or a path to a JSON table.
    pub fn from_arg(arg: &str) -> FitResult<Self> {
        match arg.parse::<Lineshape>() {
            Ok(shape) => Ok(shape),
            Err(err) => {
                if Path::new(arg).is_file() {
                    Ok(Lineshape::Interpolated(InterpLineshape::from_path(arg)?))
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Lineshape::Gaussian => "Gaussian",
            Lineshape::Lorentzian => "Lorentzian",
            Lineshape::SuperLorentzian => "SuperLorentzian",
            Lineshape::Interpolated(_) => "Interpolated",
        }
    }

    /// `g(Δ; T2)` in seconds.
    pub fn value(&self, df: f64, t2: f64) -> f64 {
        match self {
            Lineshape::Gaussian => gaussian(df, t2),
            Lineshape::Lorentzian => lorentzian(df, t2),
            Lineshape::SuperLorentzian => super_lorentzian(df, t2),
            Lineshape::Interpolated(table) => table.value(df, t2),
        }
    }
}

fn gaussian(df: f64, t2: f64) -> f64 {
    let x = 2.0 * PI * df * t2;
    t2 / (2.0 * PI).sqrt() * (-0.5 * x * x).exp()
}

fn lorentzian(df: f64, t2: f64) -> f64 {
    let x = 2.0 * PI * df * t2;
    (t2 / PI) / (1.0 + x * x)
}

fn super_lorentzian(df: f64, t2: f64) -> f64 {
    let x = 2.0 * PI * df * t2;
    let norm = (2.0 / PI).sqrt() * t2;
    let h = 1.0 / SUPER_LORENTZIAN_NODES as f64;
    let mut acc = 0.0;
    for i in 0..SUPER_LORENTZIAN_NODES {
        let u = (i as f64 + 0.5) * h;
        let p = (3.0 * u * u - 1.0).abs();
        if p < MAGIC_ANGLE_EPS {
            continue;
        }
        let z = x / p;
        acc += (-2.0 * z * z).exp() / p;
    }
    norm * acc * h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Closed-form values of the Gaussian and Lorentzian shapes.
    // - Positivity and decay of the Super-Lorentzian.
    // - Name parsing and interpolated tables loaded from disk.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Check on-resonance peak heights of the closed-form shapes.
    //
    // Given
    // -----
    // - T2 = 10 µs, Δ = 0.
    //
    // Expect
    // ------
    // - Gaussian T2/√(2π); Lorentzian T2/π.
    fn closed_form_shapes_peak_on_resonance() {
        // Arrange
        let t2 = 10e-6;

        // Act / Assert
        assert_relative_eq!(Lineshape::Gaussian.value(0.0, t2), t2 / (2.0 * PI).sqrt());
        assert_relative_eq!(Lineshape::Lorentzian.value(0.0, t2), t2 / PI);
    }

    #[test]
    // Purpose
    // -------
    // Verify the Super-Lorentzian is positive, even and decreasing off resonance.
    //
    // Given
    // -----
    // - T2 = 12 µs, offsets 1, 5 and 20 kHz and their negatives.
    //
    // Expect
    // ------
    // - g(1k) > g(5k) > g(20k) > 0 and g(−Δ) == g(Δ).
    fn super_lorentzian_is_even_and_decays() {
        // Arrange
        let t2 = 12e-6;
        let shape = Lineshape::SuperLorentzian;

        // Act
        let g: Vec<f64> = [1e3, 5e3, 20e3].iter().map(|&d| shape.value(d, t2)).collect();

        // Assert
        assert!(g[0] > g[1] && g[1] > g[2] && g[2] > 0.0);
        assert_relative_eq!(shape.value(-5e3, t2), g[1]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure names parse case-insensitively and unknown names are rejected.
    //
    // Given
    // -----
    // - "Superlorentzian", "GAUSSIAN" and a non-existent name.
    //
    // Expect
    // ------
    // - The two known shapes; `UnknownLineshape` otherwise.
    fn lineshape_names_parse() {
        // Act / Assert
        assert_eq!(Lineshape::from_arg("Superlorentzian"), Ok(Lineshape::SuperLorentzian));
        assert_eq!(Lineshape::from_arg("GAUSSIAN"), Ok(Lineshape::Gaussian));
        assert!(matches!(
            Lineshape::from_arg("no-such-shape"),
            Err(FitError::UnknownLineshape { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Load an interpolated table and check interpolation, rescaling and clamping.
    //
    // Given
    // -----
    // - Table at T2b = 10 µs: frequencies [0, 1000, 2000], values [4, 2, 0] µs.
    //
    // Expect
    // ------
    // - g(500; 10 µs) = 3 µs; g(500; 20 µs) = 2·g_ref(1000) = 4 µs;
    //   g(5000; 10 µs) clamps to 0.
    fn interpolated_table_loads_and_interpolates() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"lineshape": {{"T2b": 1e-5, "frequencies": [0, 1000, 2000], "values": [4e-6, 2e-6, 0]}}}}"#
        )
        .expect("write table");
        let path = file.path().to_str().expect("utf-8 path").to_string();

        // Act
        let shape = Lineshape::from_arg(&path).expect("table loads");

        // Assert
        assert_eq!(shape.name(), "Interpolated");
        assert_relative_eq!(shape.value(500.0, 1e-5), 3e-6, epsilon = 1e-18);
        assert_relative_eq!(shape.value(-500.0, 2e-5), 4e-6, epsilon = 1e-18);
        assert_relative_eq!(shape.value(5000.0, 1e-5), 0.0, epsilon = 1e-18);
    }
}

//! fitting::core::sequence — acquisition-sequence descriptions.
//!
//! Purpose
//! -------
//! Describe the acquisitions that produced each input image: repetition
//! and echo times, flip angles, saturation pulses. A sequence's `size()` is
//! the number of measurements (channels) of the image it describes.
//!
//! Key behaviors
//! -------------
//! - Sequences deserialize from JSON via `serde`; [`SequenceDoc`] holds a
//!   parsed document and hands out typed sequences by key (`"SPGR"`,
//!   `"SPGREcho"`, `"MultiEcho"`, `"MTSat"`).
//! - Every typed access validates the sequence (non-empty, consistent
//!   array lengths, positive times) and reports problems as
//!   `FitError::InvalidSequence`.
//!
//! Conventions
//! -----------
//! - Times are in seconds, frequencies in Hz, angles in **degrees** in the
//!   document and converted to radians on use (`*_rad` helpers).
//! - Sequences are immutable after construction and shared read-only
//!   across worker threads.
use crate::fitting::errors::{FitError, FitResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Common interface of every sequence description.
pub trait Sequence: Send + Sync {
    /// Key under which the sequence appears in a document.
    fn kind(&self) -> &'static str;

    /// Number of measurements.
    fn size(&self) -> usize;

    /// Check internal consistency.
    fn validate(&self) -> FitResult<()>;
}

fn invalid(kind: &str, reason: impl Into<String>) -> FitError {
    FitError::InvalidSequence { reason: format!("{kind}: {}", reason.into()) }
}

fn check_positive(kind: &str, name: &str, value: f64) -> FitResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(kind, format!("{name} must be finite and > 0, got {value}")));
    }
    Ok(())
}

fn check_finite_list(kind: &str, name: &str, values: &[f64]) -> FitResult<()> {
    if values.is_empty() {
        return Err(invalid(kind, format!("{name} is empty")));
    }
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(invalid(kind, format!("{name} contains non-finite value {v}")));
    }
    Ok(())
}

/// Spoiled gradient echo with a list of flip angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpgrSequence {
    #[serde(rename = "TR")]
    pub tr: f64,
    #[serde(rename = "FA")]
    pub flip_angles: Vec<f64>,
}

impl SpgrSequence {
    pub fn flip_angles_rad(&self) -> impl Iterator<Item = f64> + '_ {
        self.flip_angles.iter().map(|a| a.to_radians())
    }
}

impl Sequence for SpgrSequence {
    fn kind(&self) -> &'static str {
        "SPGR"
    }

    fn size(&self) -> usize {
        self.flip_angles.len()
    }

    fn validate(&self) -> FitResult<()> {
        check_positive(self.kind(), "TR", self.tr)?;
        check_finite_list(self.kind(), "FA", &self.flip_angles)
    }
}

/// Spoiled gradient echo that also records its echo time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpgrEchoSequence {
    #[serde(rename = "TR")]
    pub tr: f64,
    #[serde(rename = "TE")]
    pub te: f64,
    #[serde(rename = "FA")]
    pub flip_angles: Vec<f64>,
}

impl SpgrEchoSequence {
    /// Drop the echo time; the steady-state amplitude does not depend on it.
    pub fn to_spgr(&self) -> SpgrSequence {
        SpgrSequence { tr: self.tr, flip_angles: self.flip_angles.clone() }
    }
}

impl Sequence for SpgrEchoSequence {
    fn kind(&self) -> &'static str {
        "SPGREcho"
    }

    fn size(&self) -> usize {
        self.flip_angles.len()
    }

    fn validate(&self) -> FitResult<()> {
        check_positive(self.kind(), "TR", self.tr)?;
        check_positive(self.kind(), "TE", self.te)?;
        if self.te >= self.tr {
            return Err(invalid(self.kind(), "TE must be shorter than TR"));
        }
        check_finite_list(self.kind(), "FA", &self.flip_angles)
    }
}

/// Multi-echo spin echo: one measurement per echo time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiEchoSequence {
    #[serde(rename = "TR")]
    pub tr: f64,
    #[serde(rename = "TE")]
    pub echo_times: Vec<f64>,
}

impl Sequence for MultiEchoSequence {
    fn kind(&self) -> &'static str {
        "MultiEcho"
    }

    fn size(&self) -> usize {
        self.echo_times.len()
    }

    fn validate(&self) -> FitResult<()> {
        check_positive(self.kind(), "TR", self.tr)?;
        check_finite_list(self.kind(), "TE", &self.echo_times)?;
        if let Some(te) = self.echo_times.iter().find(|te| **te < 0.0) {
            return Err(invalid(self.kind(), format!("negative echo time {te}")));
        }
        Ok(())
    }
}

/// Shape integrals of an off-resonance saturation pulse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseShape {
    pub p1: f64,
    pub p2: f64,
}

/// MT-weighted acquisition: one measurement per (offset, saturation angle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtSatSequence {
    #[serde(rename = "TR")]
    pub tr: f64,
    #[serde(rename = "Trf")]
    pub trf: f64,
    pub sat_f0: Vec<f64>,
    pub sat_angle: Vec<f64>,
    pub pulse: PulseShape,
}

impl Sequence for MtSatSequence {
    fn kind(&self) -> &'static str {
        "MTSat"
    }

    fn size(&self) -> usize {
        self.sat_f0.len()
    }

    fn validate(&self) -> FitResult<()> {
        check_positive(self.kind(), "TR", self.tr)?;
        check_positive(self.kind(), "Trf", self.trf)?;
        check_positive(self.kind(), "pulse.p1", self.pulse.p1)?;
        check_positive(self.kind(), "pulse.p2", self.pulse.p2)?;
        check_finite_list(self.kind(), "sat_f0", &self.sat_f0)?;
        check_finite_list(self.kind(), "sat_angle", &self.sat_angle)?;
        if self.sat_f0.len() != self.sat_angle.len() {
            return Err(invalid(
                self.kind(),
                format!(
                    "sat_f0 has {} entries but sat_angle has {}",
                    self.sat_f0.len(),
                    self.sat_angle.len()
                ),
            ));
        }
        if self.sat_f0.iter().any(|f| *f == 0.0) {
            return Err(invalid(self.kind(), "saturation offsets must be non-zero"));
        }
        Ok(())
    }
}

/// A parsed sequence document: a JSON object keyed by sequence kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDoc {
    root: serde_json::Map<String, serde_json::Value>,
}

impl FromStr for SequenceDoc {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match serde_json::from_str::<serde_json::Value>(s)? {
            serde_json::Value::Object(root) => Ok(Self { root }),
            _ => Err(FitError::InvalidSequence {
                reason: "document root must be a JSON object".to_string(),
            }),
        }
    }
}

impl SequenceDoc {
    pub fn from_path<P: AsRef<Path>>(path: P) -> FitResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FitError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        text.parse()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    /// Deserialize and validate the sequence stored under `key`.
    pub fn get<T: Sequence + DeserializeOwned>(&self, key: &str) -> FitResult<T> {
        let value = self.root.get(key).ok_or_else(|| FitError::InvalidSequence {
            reason: format!("document has no '{key}' entry"),
        })?;
        let sequence: T = serde_json::from_value(value.clone())?;
        sequence.validate()?;
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Parsing of each sequence kind from JSON, including degree angles.
    // - Validation failures surfacing as `InvalidSequence`.
    // - Missing keys and non-object documents.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify an SPGR entry parses and reports its size and radian angles.
    //
    // Given
    // -----
    // - {"SPGR": {"TR": 0.01, "FA": [3, 18]}}.
    //
    // Expect
    // ------
    // - size 2; angles converted to radians.
    fn spgr_parses_from_document() {
        // Arrange
        let doc: SequenceDoc =
            r#"{"SPGR": {"TR": 0.01, "FA": [3, 18]}}"#.parse().expect("valid JSON");

        // Act
        let spgr: SpgrSequence = doc.get("SPGR").expect("valid SPGR");

        // Assert
        assert_eq!(spgr.size(), 2);
        let rad: Vec<f64> = spgr.flip_angles_rad().collect();
        assert!((rad[1] - 18f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Ensure an MT-sat entry with mismatched arrays is rejected.
    //
    // Given
    // -----
    // - Two offsets but one saturation angle.
    //
    // Expect
    // ------
    // - `FitError::InvalidSequence` mentioning both arrays.
    fn mtsat_rejects_mismatched_arrays() {
        // Arrange
        let doc: SequenceDoc = r#"{"MTSat": {"TR": 0.03, "Trf": 0.015,
            "sat_f0": [1000, 2000], "sat_angle": [360],
            "pulse": {"p1": 0.4, "p2": 0.3}}}"#
            .parse()
            .expect("valid JSON");

        // Act
        let result = doc.get::<MtSatSequence>("MTSat");

        // Assert
        match result {
            Err(FitError::InvalidSequence { reason }) => assert!(reason.contains("sat_angle")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Check missing keys, type errors and non-object roots.
    //
    // Given
    // -----
    // - A document without "MultiEcho", one with a string TR, and a JSON array.
    //
    // Expect
    // ------
    // - `InvalidSequence` in every case.
    fn sequence_doc_reports_malformed_documents() {
        // Arrange
        let doc: SequenceDoc = r#"{"SPGR": {"TR": "fast", "FA": [3]}}"#.parse().expect("valid JSON");

        // Act / Assert
        assert!(matches!(doc.get::<MultiEchoSequence>("MultiEcho"), Err(FitError::InvalidSequence { .. })));
        assert!(matches!(doc.get::<SpgrSequence>("SPGR"), Err(FitError::InvalidSequence { .. })));
        assert!(matches!("[1, 2]".parse::<SequenceDoc>(), Err(FitError::InvalidSequence { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Verify SPGR-echo validation and conversion to a plain SPGR sequence.
    //
    // Given
    // -----
    // - TR = 0.01, TE = 0.004, two flip angles; and a variant with TE > TR.
    //
    // Expect
    // ------
    // - The first converts with identical TR/FA; the second is rejected.
    fn spgr_echo_validates_and_converts() {
        // Arrange
        let ok = SpgrEchoSequence { tr: 0.01, te: 0.004, flip_angles: vec![4.0, 20.0] };
        let bad = SpgrEchoSequence { tr: 0.01, te: 0.02, flip_angles: vec![4.0] };

        // Act
        let spgr = ok.to_spgr();

        // Assert
        assert!(ok.validate().is_ok());
        assert_eq!(spgr.tr, 0.01);
        assert_eq!(spgr.flip_angles, vec![4.0, 20.0]);
        assert!(matches!(bad.validate(), Err(FitError::InvalidSequence { .. })));
    }
}

//! models — the concrete model catalogue and its name registry.
//!
//! Purpose
//! -------
//! Provide ready-made [`Model`] implementations and a single entry point,
//! [`build_model`], that turns a model name plus a sequence document into a
//! boxed model the pipeline can drive.
//!
//! Key behaviors
//! -------------
//! - `constant`: one input, every measurement equals `S`.
//! - `spgr` (alias `despot1`): T1 from variable-flip-angle SPGR data
//!   (`"SPGR"` entry, or `"SPGREcho"` when no plain entry is present).
//! - `multiecho` (alias `mese`): mono-exponential T2 (`"MultiEcho"` entry).
//! - `qmt` (alias `ramani`): two-pool MT (`"MTSat"` entry), using the
//!   lineshape and bound-pool R1 from [`ModelSettings`].
//! - Names are matched case-insensitively; anything else is
//!   `FitError::UnknownModel`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every returned model passes [`Model::validate`].
//! - Sequences are validated when read from the document.
//!
//! Testing notes
//! -------------
//! - Each model file checks its own counts and signal; the registry tests
//!   below cover name resolution and document lookups.

pub mod constant;
pub mod multiecho;
pub mod qmt;
pub mod spgr;

pub use self::constant::ConstantModel;
pub use self::multiecho::MultiEchoModel;
pub use self::qmt::{QmtModel, DEFAULT_R1_B};
pub use self::spgr::SpgrModel;

use crate::fitting::{
    core::{
        lineshape::Lineshape,
        model::Model,
        sequence::{
            MtSatSequence, MultiEchoSequence, Sequence, SequenceDoc, SpgrEchoSequence, SpgrSequence,
        },
    },
    errors::{FitError, FitResult},
};

/// Canonical model names understood by [`build_model`].
pub const MODEL_NAMES: [&str; 4] = ["constant", "spgr", "multiecho", "qmt"];

/// Model-specific settings that are not part of any sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub lineshape: Lineshape,
    /// Bound-pool R1 (s⁻¹) for `qmt`.
    pub r1_b: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { lineshape: Lineshape::default(), r1_b: DEFAULT_R1_B }
    }
}

impl ModelSettings {
    /// # Errors
    /// `FitError::InvalidOption` unless `r1_b` is finite and `> 0`.
    pub fn new(lineshape: Lineshape, r1_b: f64) -> FitResult<Self> {
        if !(r1_b.is_finite() && r1_b > 0.0) {
            return Err(FitError::InvalidOption { name: "r1_b", reason: "must be finite and > 0" });
        }
        Ok(Self { lineshape, r1_b })
    }
}

/// Build the model called `name` from the sequences in `doc`.
///
/// # Errors
/// - `FitError::UnknownModel` for unrecognised names.
/// - `FitError::InvalidSequence` when the required entry is missing or
///   inconsistent.
/// - `FitError::InvalidModel` if the built model fails validation.
pub fn build_model(name: &str, doc: &SequenceDoc, settings: &ModelSettings) -> FitResult<Box<dyn Model>> {
    let model: Box<dyn Model> = match name.trim().to_ascii_lowercase().as_str() {
        "constant" => Box::new(ConstantModel::new(any_sequence_size(doc)?)),
        "spgr" | "despot1" => Box::new(SpgrModel::new(&spgr_sequence(doc)?)),
        "multiecho" | "mese" => Box::new(MultiEchoModel::new(&doc.get::<MultiEchoSequence>("MultiEcho")?)),
        "qmt" | "ramani" => Box::new(QmtModel::new(
            doc.get::<MtSatSequence>("MTSat")?,
            settings.lineshape.clone(),
            settings.r1_b,
        )),
        _ => return Err(FitError::UnknownModel { name: name.to_string() }),
    };
    model.validate()?;
    Ok(model)
}

fn spgr_sequence(doc: &SequenceDoc) -> FitResult<SpgrSequence> {
    if !doc.contains("SPGR") && doc.contains("SPGREcho") {
        return Ok(doc.get::<SpgrEchoSequence>("SPGREcho")?.to_spgr());
    }
    doc.get::<SpgrSequence>("SPGR")
}

/// Measurement count of the first known sequence entry in `doc`.
fn any_sequence_size(doc: &SequenceDoc) -> FitResult<usize> {
    if doc.contains("SPGR") {
        return Ok(doc.get::<SpgrSequence>("SPGR")?.size());
    }
    if doc.contains("SPGREcho") {
        return Ok(doc.get::<SpgrEchoSequence>("SPGREcho")?.size());
    }
    if doc.contains("MultiEcho") {
        return Ok(doc.get::<MultiEchoSequence>("MultiEcho")?.size());
    }
    if doc.contains("MTSat") {
        return Ok(doc.get::<MtSatSequence>("MTSat")?.size());
    }
    Err(FitError::InvalidSequence { reason: "document has no known sequence entry".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Name resolution (aliases, case) and unknown names.
    // - Sequence lookups per model, including the SPGREcho fallback.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify each canonical name builds a model with the expected input size.
    //
    // Given
    // -----
    // - A document with SPGR (3 angles), MultiEcho (4 echoes) and MTSat
    //   (2 offsets) entries.
    //
    // Expect
    // ------
    // - constant → 3 (first known entry), spgr → 3, multiecho → 4, qmt → 2.
    fn registry_builds_every_model() {
        // Arrange
        let doc: SequenceDoc = r#"{
            "SPGR": {"TR": 0.01, "FA": [3, 12, 20]},
            "MultiEcho": {"TR": 2.0, "TE": [0.01, 0.02, 0.03, 0.04]},
            "MTSat": {"TR": 0.03, "Trf": 0.015, "sat_f0": [1000, 5000],
                      "sat_angle": [360, 360], "pulse": {"p1": 0.416, "p2": 0.295}}
        }"#
        .parse()
        .expect("valid JSON");
        let settings = ModelSettings::default();

        // Act
        let sizes: Vec<(String, usize)> = MODEL_NAMES
            .iter()
            .map(|name| {
                let model = build_model(name, &doc, &settings).expect("model builds");
                (model.name().to_string(), model.input_size(0))
            })
            .collect();

        // Assert
        assert_eq!(
            sizes,
            vec![
                ("constant".to_string(), 3),
                ("spgr".to_string(), 3),
                ("multiecho".to_string(), 4),
                ("qmt".to_string(), 2)
            ]
        );
    }

    #[test]
    // Purpose
    // -------
    // Check aliases, the SPGREcho fallback and error reporting.
    //
    // Given
    // -----
    // - A document with only an SPGREcho entry.
    //
    // Expect
    // ------
    // - "DESPOT1" builds an SPGR model; "qmt" reports a missing MTSat entry;
    //   "t2star" is an unknown model; a zero R1_b is rejected.
    fn registry_aliases_and_errors() {
        // Arrange
        let doc: SequenceDoc =
            r#"{"SPGREcho": {"TR": 0.01, "TE": 0.003, "FA": [4, 18]}}"#.parse().expect("valid JSON");
        let settings = ModelSettings::default();

        // Act / Assert
        let spgr = build_model("DESPOT1", &doc, &settings).expect("alias builds");
        assert_eq!(spgr.name(), "spgr");
        assert_eq!(spgr.n_measurements(), 2);
        assert!(matches!(build_model("qmt", &doc, &settings), Err(FitError::InvalidSequence { .. })));
        assert!(matches!(build_model("t2star", &doc, &settings), Err(FitError::UnknownModel { .. })));
        assert!(matches!(
            ModelSettings::new(Lineshape::Lorentzian, 0.0),
            Err(FitError::InvalidOption { name: "r1_b", .. })
        ));
    }
}

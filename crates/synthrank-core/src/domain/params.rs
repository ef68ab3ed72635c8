//! Immutable per-round configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::{Result, RoundError};

/// How candidates are ordered once scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// Scalarized coverage vs similarity; lower score is better.
    #[default]
    Composite,
    /// Non-dominated sorting on (coverage up, norm similarity down).
    Pareto,
}

impl std::fmt::Display for RankMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankMode::Composite => f.write_str("composite"),
            RankMode::Pareto => f.write_str("pareto"),
        }
    }
}

impl std::str::FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "composite" => Ok(RankMode::Composite),
            "pareto" => Ok(RankMode::Pareto),
            other => Err(format!("unknown rank mode: {other}")),
        }
    }
}

/// Configuration for one round. Constructed once and never mutated while
/// the round runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundParameters {
    /// Text the instruction and rubric are compiled from.
    pub source_text: String,

    /// Model that compiles the task instruction.
    pub instruction_model: String,

    /// Model that compiles the rubric points.
    pub rubric_model: String,

    /// Model acting as the coverage judge.
    pub coverage_model: String,

    /// Models whose responses compete for winner slots.
    pub candidate_models: Vec<String>,

    /// Models whose responses only serve as a novelty baseline.
    #[serde(default)]
    pub anchor_models: Vec<String>,

    #[serde(default = "default_candidate_temperature")]
    pub candidate_temperature: f64,

    #[serde(default = "default_anchor_temperature")]
    pub anchor_temperature: f64,

    /// Temperature for the instruction and rubric calls.
    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f64,

    /// Number of winners to return (>= 1).
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub rank_mode: RankMode,

    /// Weight of the coverage term in composite mode (0.0–1.0).
    #[serde(default = "default_coverage_weight")]
    pub coverage_weight: f64,

    /// Exclude candidates below `coverage_threshold` before ranking.
    #[serde(default)]
    pub use_gate: bool,

    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,

    /// Truncate `top_candidates` texts to previews in the artifact bundle.
    #[serde(default)]
    pub redact_transport: bool,
}

fn default_candidate_temperature() -> f64 {
    0.9
}

fn default_anchor_temperature() -> f64 {
    0.3
}

fn default_synthesis_temperature() -> f64 {
    0.1
}

fn default_top_n() -> usize {
    1
}

fn default_coverage_weight() -> f64 {
    0.7
}

fn default_coverage_threshold() -> f64 {
    0.8
}

impl RoundParameters {
    /// Create parameters with every tunable at its default.
    pub fn new(
        source_text: impl Into<String>,
        instruction_model: impl Into<String>,
        rubric_model: impl Into<String>,
        coverage_model: impl Into<String>,
        candidate_models: Vec<String>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            instruction_model: instruction_model.into(),
            rubric_model: rubric_model.into(),
            coverage_model: coverage_model.into(),
            candidate_models,
            anchor_models: Vec::new(),
            candidate_temperature: default_candidate_temperature(),
            anchor_temperature: default_anchor_temperature(),
            synthesis_temperature: default_synthesis_temperature(),
            top_n: default_top_n(),
            rank_mode: RankMode::default(),
            coverage_weight: default_coverage_weight(),
            use_gate: false,
            coverage_threshold: default_coverage_threshold(),
            redact_transport: false,
        }
    }

    pub fn with_anchor_models(mut self, anchor_models: Vec<String>) -> Self {
        self.anchor_models = anchor_models;
        self
    }

    pub fn with_temperatures(mut self, candidate: f64, anchor: f64) -> Self {
        self.candidate_temperature = candidate;
        self.anchor_temperature = anchor;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_rank_mode(mut self, rank_mode: RankMode) -> Self {
        self.rank_mode = rank_mode;
        self
    }

    pub fn with_coverage_weight(mut self, coverage_weight: f64) -> Self {
        self.coverage_weight = coverage_weight;
        self
    }

    /// Enable the coverage gate at the given threshold.
    pub fn with_gate(mut self, coverage_threshold: f64) -> Self {
        self.use_gate = true;
        self.coverage_threshold = coverage_threshold;
        self
    }

    pub fn with_redact_transport(mut self, redact: bool) -> Self {
        self.redact_transport = redact;
        self
    }

    /// SHA-256 hex digest of the source text, recorded for provenance.
    pub fn source_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check structural invariants before any collaborator is called.
    pub fn validate(&self) -> Result<()> {
        if self.source_text.trim().is_empty() {
            return Err(invalid("source_text must not be empty"));
        }
        for (field, value) in [
            ("instruction_model", &self.instruction_model),
            ("rubric_model", &self.rubric_model),
            ("coverage_model", &self.coverage_model),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(&format!("{field} must not be empty")));
            }
        }
        if self.candidate_models.is_empty() {
            return Err(invalid("candidate_models must list at least one model"));
        }
        check_unique("candidate_models", &self.candidate_models)?;
        check_unique("anchor_models", &self.anchor_models)?;

        let candidates: HashSet<&str> =
            self.candidate_models.iter().map(String::as_str).collect();
        if let Some(shared) = self
            .anchor_models
            .iter()
            .find(|m| candidates.contains(m.as_str()))
        {
            return Err(invalid(&format!(
                "model {shared} appears in both candidate_models and anchor_models"
            )));
        }

        if self.top_n == 0 {
            return Err(invalid("top_n must be at least 1"));
        }
        check_unit("coverage_weight", self.coverage_weight)?;
        check_unit("coverage_threshold", self.coverage_threshold)?;
        for (field, value) in [
            ("candidate_temperature", self.candidate_temperature),
            ("anchor_temperature", self.anchor_temperature),
            ("synthesis_temperature", self.synthesis_temperature),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn invalid(reason: &str) -> RoundError {
    RoundError::InvalidParameters(reason.to_string())
}

pub(crate) fn check_unit(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(invalid(&format!("{field} must be within [0, 1], got {value}")));
    }
    Ok(())
}

fn check_unique(field: &str, models: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for model in models {
        if model.trim().is_empty() {
            return Err(invalid(&format!("{field} contains an empty model id")));
        }
        if !seen.insert(model.as_str()) {
            return Err(invalid(&format!("{field} lists {model} more than once")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RoundParameters {
        RoundParameters::new(
            "The mitochondria is the powerhouse of the cell.",
            "compiler",
            "rubricator",
            "judge",
            vec!["cand-a".to_string(), "cand-b".to_string()],
        )
        .with_anchor_models(vec!["anchor-a".to_string()])
    }

    #[test]
    fn test_defaults_are_valid() {
        let p = params();
        assert_eq!(p.top_n, 1);
        assert_eq!(p.rank_mode, RankMode::Composite);
        assert_eq!(p.coverage_weight, 0.7);
        assert!(!p.use_gate);
        p.validate().expect("default parameters validate");
    }

    #[test]
    fn test_rejects_overlapping_model_lists() {
        let p = params().with_anchor_models(vec!["cand-a".to_string()]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("cand-a"));
    }

    #[test]
    fn test_rejects_zero_top_n() {
        let err = params().with_top_n(0).validate().unwrap_err();
        assert!(err.to_string().contains("top_n"));
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        assert!(params().with_coverage_weight(1.5).validate().is_err());
        assert!(params().with_coverage_weight(f64::NAN).validate().is_err());
        assert!(params().with_gate(-0.1).validate().is_err());
    }

    #[test]
    fn test_rejects_empty_candidates_and_source() {
        let mut p = params();
        p.candidate_models.clear();
        assert!(p.validate().is_err());

        let mut p = params();
        p.source_text = "   ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_models() {
        let mut p = params();
        p.candidate_models.push("cand-a".to_string());
        assert!(p.validate().unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let json = serde_json::json!({
            "source_text": "source",
            "instruction_model": "m1",
            "rubric_model": "m2",
            "coverage_model": "m3",
            "candidate_models": ["c1"],
            "rank_mode": "pareto"
        });
        let p: RoundParameters = serde_json::from_value(json).expect("deserialize");
        assert_eq!(p.rank_mode, RankMode::Pareto);
        assert_eq!(p.top_n, 1);
        assert_eq!(p.coverage_threshold, 0.8);
        assert!(p.anchor_models.is_empty());
    }

    #[test]
    fn test_source_digest_is_stable_hex() {
        let p = params();
        let digest = p.source_digest();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, params().source_digest());
    }

    #[test]
    fn test_rank_mode_from_str() {
        assert_eq!("Pareto".parse::<RankMode>().unwrap(), RankMode::Pareto);
        assert!("borda".parse::<RankMode>().is_err());
    }
}

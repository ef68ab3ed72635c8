//! Per-model response records produced during a round.

use serde::{Deserialize, Serialize};

/// A generated anchor response. Anchors are never scored or ranked; they
/// only pull `min_sim_anchors` up for candidates that resemble them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnchorItem {
    pub model_id: String,
    pub text: String,
}

/// A generated candidate response and everything the round learned about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub model_id: String,
    pub text: String,

    /// Rubric coverage in [0, 1]; `None` when the judge produced no score.
    pub coverage: Option<f64>,

    /// Cosine similarity to the source text.
    pub sim_source: Option<f64>,

    /// Minimum cosine similarity to any anchor.
    pub min_sim_anchors: Option<f64>,

    /// Blend of the similarity terms; higher means less novel.
    pub norm_similarity: Option<f64>,

    /// Composite score; lower is better. `None` until ranked or when unrankable.
    pub rank_score: Option<f64>,

    /// Excluded from winner selection by the coverage gate.
    #[serde(default)]
    pub gated_out: bool,

    /// Non-dominated front index (pareto mode only).
    #[serde(default)]
    pub pareto_front: Option<usize>,
}

impl CandidateItem {
    pub fn new(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            text: text.into(),
            coverage: None,
            sim_source: None,
            min_sim_anchors: None,
            norm_similarity: None,
            rank_score: None,
            gated_out: false,
            pareto_front: None,
        }
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn with_norm_similarity(mut self, norm_similarity: f64) -> Self {
        self.norm_similarity = Some(norm_similarity);
        self
    }

    /// Both ranking inputs are present.
    pub fn is_rankable(&self) -> bool {
        self.coverage.is_some() && self.norm_similarity.is_some()
    }
}

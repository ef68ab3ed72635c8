//! The immutable output bundle of one round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::items::{AnchorItem, CandidateItem};
use crate::domain::params::RoundParameters;

/// Character budget for previews of redacted texts.
pub const PREVIEW_CHARS: usize = 200;

/// Everything a completed round produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundArtifacts {
    pub round_id: Uuid,

    /// SHA-256 hex digest of `params.source_text`.
    pub source_digest: String,

    pub instruction_set: String,

    /// Rubric points in the order the judge indexes them.
    pub coverage_points: Vec<String>,

    pub anchors: Vec<AnchorItem>,

    /// All candidates in generation order.
    pub candidates: Vec<CandidateItem>,

    /// The same candidates in rank order.
    pub candidates_sorted: Vec<CandidateItem>,

    /// Top-N candidates with full text.
    pub winners: Vec<CandidateItem>,

    /// Same as `winners`; texts are previews when `params.redact_transport` is set.
    pub top_candidates: Vec<CandidateItem>,

    /// Soft failures observed while the round ran.
    #[serde(default)]
    pub warnings: Vec<String>,

    pub params: RoundParameters,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoundArtifacts {
    /// Copy with anchor and top-candidate texts cut down to previews.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for anchor in &mut copy.anchors {
            anchor.text = preview(&anchor.text);
        }
        copy.top_candidates = redact_candidates(&copy.top_candidates);
        copy
    }
}

pub(crate) fn redact_candidates(items: &[CandidateItem]) -> Vec<CandidateItem> {
    items
        .iter()
        .cloned()
        .map(|mut c| {
            c.text = preview(&c.text);
            c
        })
        .collect()
}

/// Truncate to [`PREVIEW_CHARS`] characters, appending "..." when cut.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(PREVIEW_CHARS - 3).collect();
    format!("{kept}...")
}

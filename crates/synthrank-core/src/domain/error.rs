//! Error taxonomy for synthesis-and-ranking rounds.

use serde::{Deserialize, Serialize};

/// The stage of a round a failure or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Instruction,
    Assertions,
    Generation,
    Coverage,
    Embedding,
    Ranking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Instruction => "instruction",
            Stage::Assertions => "assertions",
            Stage::Generation => "generation",
            Stage::Coverage => "coverage",
            Stage::Embedding => "embedding",
            Stage::Ranking => "ranking",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by injected collaborators (chat, generation, judge, embedder).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Rate limits, server errors, timeouts. Safe to retry.
    #[error("transient collaborator error: {0}")]
    Transient(String),

    #[error("collaborator error: {0}")]
    Failed(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

/// A recoverable failure affecting one unit of work (one model's response,
/// one score, one embedding). Reported as a `warning` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftFailure {
    pub stage: Stage,
    /// Model id or text label the failure applies to.
    pub subject: String,
    pub reason: String,
}

impl SoftFailure {
    pub fn new(stage: Stage, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.stage, self.subject, self.reason)
    }
}

/// Fatal round errors. Anything recoverable is reported as a `warning` event
/// instead and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("invalid round parameters: {0}")]
    InvalidParameters(String),

    #[error("{stage} stage failed: {reason}")]
    StageFailed { stage: Stage, reason: String },

    #[error("no candidate responses survived generation")]
    NoCandidates,

    #[error("round cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RoundError {
    /// The stage tag carried by the `error` event for this failure.
    pub fn stage(&self) -> Stage {
        match self {
            RoundError::InvalidParameters(_) => Stage::Start,
            RoundError::StageFailed { stage, .. } => *stage,
            RoundError::NoCandidates => Stage::Generation,
            RoundError::Cancelled { stage } => *stage,
            RoundError::Serialization(_) => Stage::Ranking,
        }
    }
}

/// Result type for round operations.
pub type Result<T> = std::result::Result<T, RoundError>;

//! Synthrank Core Library
//!
//! Candidate synthesis and ranking: compile an instruction and rubric from a
//! source text, fan generation out to candidate and anchor models, score
//! coverage, measure similarity and rank the survivors.

pub mod cancel;
pub mod collaborators;
pub mod coverage;
pub mod domain;
pub mod embedding;
pub mod events;
pub mod extract;
pub mod fakes;
pub mod generation;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod rank;
pub mod similarity;
pub mod synth;
pub mod telemetry;

pub use cancel::{CancelHandle, CancelSignal};

pub use collaborators::{
    ChatCompletion, ChatRequest, ConfigBuilder, CoverageEvaluator, CoverageScore,
    DefaultConfigBuilder, Embedder, GeneratedResponse, GenerationConfig, GroupOutcomes,
    ModelOutcomes, ResponseGenerator, RoundCollaborators, ANCHOR_GROUP, CANDIDATE_GROUP,
};

pub use domain::{
    preview, AnchorItem, CandidateItem, CollaboratorError, RankMode, Result, RoundArtifacts,
    RoundError, RoundParameters, SoftFailure, Stage, PREVIEW_CHARS,
};

pub use events::{
    CallbackSink, EventRecorder, NullSink, RoundEvent, RoundEventKind, RoundEventSink,
};
pub use extract::{extract_draft, extract_nonempty_draft};
pub use orchestrator::{RoundRunner, RunnerConfig};
pub use rank::{
    composite_score, pareto_fronts, rank_candidates, rerank_artifacts, RankOptions, RankOutcome,
};
pub use similarity::{cosine_similarity, similarity_terms, SimilarityTerms};
pub use synth::{parse_rubric, RetryPolicy};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Narrow interfaces to the external services a round depends on.
//!
//! The orchestrator never talks to a concrete chat, embedding, or judge
//! client. Production wiring supplies implementations of these traits; tests
//! use the in-memory doubles in [`crate::fakes`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{CandidateItem, CollaboratorError, RoundParameters};

/// Group id of the candidate generation configuration.
pub const CANDIDATE_GROUP: &str = "candidates";
/// Group id of the anchor generation configuration.
pub const ANCHOR_GROUP: &str = "anchors";

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// A single chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_content: String,
    pub temperature: f64,
}

/// A batch generation request: one prompt fanned out to several models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub group_id: String,
    pub models: Vec<String>,
    pub temperature: f64,
    pub system_prompt: Option<String>,
    pub prompt: String,
}

/// One model's raw generation output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedResponse {
    pub final_assistant_response_text: Option<String>,
}

impl GeneratedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            final_assistant_response_text: Some(text.into()),
        }
    }
}

/// Per-model outcomes keyed by model id.
pub type ModelOutcomes = HashMap<String, CollaboratorResult<GeneratedResponse>>;

/// Per-group outcomes keyed by group id.
pub type GroupOutcomes = HashMap<String, ModelOutcomes>;

/// A judge verdict for one candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoverageScore {
    /// Mean extent to which the rubric points are covered, in [0, 1].
    pub avg_coverage_extent: f64,
}

/// Chat completion: `(model, system?, user, temperature) -> text`.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> CollaboratorResult<String>;
}

/// Batch response generation across every model in a configuration.
///
/// Concurrency limits across models are the implementation's concern.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_all(&self, config: &GenerationConfig) -> CollaboratorResult<GroupOutcomes>;
}

/// Rubric-coverage judge, invoked once per candidate group.
#[async_trait]
pub trait CoverageEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        config: &GenerationConfig,
        candidates: &[CandidateItem],
        rubric: &[String],
    ) -> CollaboratorResult<HashMap<String, CollaboratorResult<CoverageScore>>>;
}

/// Text embedding into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>>;
}

/// Builds the two generation configurations of a round.
pub trait ConfigBuilder: Send + Sync {
    fn build_candidate_config(
        &self,
        params: &RoundParameters,
        instruction_set: &str,
        coverage_points: &[String],
    ) -> GenerationConfig;

    fn build_anchor_config(&self, params: &RoundParameters, source_text: &str) -> GenerationConfig;
}

/// Prompts that ask for `<draft>`-tagged output.
#[derive(Debug, Clone, Default)]
pub struct DefaultConfigBuilder;

const DRAFT_SYSTEM_PROMPT: &str = "You are a careful writer. Think first if you need to, \
then put only the final text inside <draft>...</draft> tags.";

impl ConfigBuilder for DefaultConfigBuilder {
    fn build_candidate_config(
        &self,
        params: &RoundParameters,
        instruction_set: &str,
        coverage_points: &[String],
    ) -> GenerationConfig {
        let mut prompt = String::from(instruction_set.trim());
        if !coverage_points.is_empty() {
            prompt.push_str("\n\nYour response should:\n");
            for point in coverage_points {
                prompt.push_str("- ");
                prompt.push_str(point);
                prompt.push('\n');
            }
        }
        GenerationConfig {
            group_id: CANDIDATE_GROUP.to_string(),
            models: params.candidate_models.clone(),
            temperature: params.candidate_temperature,
            system_prompt: Some(DRAFT_SYSTEM_PROMPT.to_string()),
            prompt,
        }
    }

    fn build_anchor_config(&self, params: &RoundParameters, source_text: &str) -> GenerationConfig {
        GenerationConfig {
            group_id: ANCHOR_GROUP.to_string(),
            models: params.anchor_models.clone(),
            temperature: params.anchor_temperature,
            system_prompt: Some(DRAFT_SYSTEM_PROMPT.to_string()),
            prompt: format!("Rewrite the following text in your own words.\n\n{source_text}"),
        }
    }
}

/// The collaborator bundle a [`crate::orchestrator::RoundRunner`] is built from.
#[derive(Clone)]
pub struct RoundCollaborators {
    pub chat: Arc<dyn ChatCompletion>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub coverage: Arc<dyn CoverageEvaluator>,
    pub embedder: Arc<dyn Embedder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RoundParameters {
        RoundParameters::new(
            "source",
            "i",
            "r",
            "j",
            vec!["c1".to_string(), "c2".to_string()],
        )
        .with_anchor_models(vec!["a1".to_string()])
        .with_temperatures(1.1, 0.2)
    }

    #[test]
    fn test_candidate_config_carries_models_and_rubric() {
        let points = vec!["mentions ATP".to_string(), "under 50 words".to_string()];
        let config = DefaultConfigBuilder.build_candidate_config(&params(), "Explain.", &points);
        assert_eq!(config.group_id, CANDIDATE_GROUP);
        assert_eq!(config.models, vec!["c1", "c2"]);
        assert_eq!(config.temperature, 1.1);
        assert!(config.prompt.starts_with("Explain."));
        assert!(config.prompt.contains("- mentions ATP"));
        assert!(config.prompt.contains("- under 50 words"));
    }

    #[test]
    fn test_anchor_config_uses_source() {
        let config = DefaultConfigBuilder.build_anchor_config(&params(), "the source text");
        assert_eq!(config.group_id, ANCHOR_GROUP);
        assert_eq!(config.models, vec!["a1"]);
        assert_eq!(config.temperature, 0.2);
        assert!(config.prompt.contains("the source text"));
    }
}

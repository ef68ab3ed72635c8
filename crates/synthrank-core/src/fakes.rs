//! In-memory collaborator doubles (testing and offline replays).
//!
//! Provides `ScriptedChat`, `StaticGenerator`, `StaticCoverage`,
//! `TableEmbedder`, and `HashingEmbedder`, which satisfy the collaborator
//! traits without any network access.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{
    ChatCompletion, ChatRequest, CollaboratorResult, CoverageEvaluator, CoverageScore, Embedder,
    GeneratedResponse, GenerationConfig, GroupOutcomes, ModelOutcomes, ResponseGenerator,
};
use crate::domain::{CandidateItem, CollaboratorError};

// ---------------------------------------------------------------------------
// ScriptedChat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ChatScript {
    failures_left: u32,
    error: Option<CollaboratorError>,
    response: Option<String>,
}

/// Chat double answering per model from a script.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    scripts: Mutex<HashMap<String, ChatScript>>,
    calls: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `model` with `text`.
    pub fn respond(self, model: &str, text: &str) -> Self {
        self.script(
            model,
            ChatScript {
                failures_left: 0,
                error: None,
                response: Some(text.to_string()),
            },
        )
    }

    /// Always fail `model` with `error`.
    pub fn fail(self, model: &str, error: CollaboratorError) -> Self {
        self.script(
            model,
            ChatScript {
                failures_left: u32::MAX,
                error: Some(error),
                response: None,
            },
        )
    }

    /// Fail `failures` times with `error`, then answer with `text`.
    pub fn fail_then_respond(
        self,
        model: &str,
        failures: u32,
        error: CollaboratorError,
        text: &str,
    ) -> Self {
        self.script(
            model,
            ChatScript {
                failures_left: failures,
                error: Some(error),
                response: Some(text.to_string()),
            },
        )
    }

    fn script(self, model: &str, script: ChatScript) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(model.to_string(), script);
        }
        self
    }

    /// Number of calls made for `model`.
    pub fn calls(&self, model: &str) -> u32 {
        self.calls
            .lock()
            .ok()
            .and_then(|c| c.get(model).copied())
            .unwrap_or(0)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> CollaboratorResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(request.model.clone()).or_insert(0) += 1;
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| CollaboratorError::Failed("chat script poisoned".to_string()))?;
        let script = scripts.get_mut(&request.model).ok_or_else(|| {
            CollaboratorError::Failed(format!("no script for model {}", request.model))
        })?;

        if script.failures_left > 0 {
            if let Some(err) = &script.error {
                script.failures_left = script.failures_left.saturating_sub(1);
                return Err(err.clone());
            }
        }
        script
            .response
            .clone()
            .ok_or_else(|| CollaboratorError::Failed("no scripted response".to_string()))
    }
}

// ---------------------------------------------------------------------------
// StaticGenerator
// ---------------------------------------------------------------------------

/// Generation double returning canned per-model outcomes.
///
/// Models without an entry are simply absent from the result map.
#[derive(Debug, Default)]
pub struct StaticGenerator {
    outcomes: HashMap<String, ModelOutcomes>,
    failed_groups: HashMap<String, CollaboratorError>,
    delay: Option<Duration>,
    configs: Mutex<Vec<GenerationConfig>>,
}

impl StaticGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, group: &str, model: &str, text: &str) -> Self {
        self.outcomes
            .entry(group.to_string())
            .or_default()
            .insert(model.to_string(), Ok(GeneratedResponse::text(text)));
        self
    }

    pub fn with_empty_response(mut self, group: &str, model: &str) -> Self {
        self.outcomes
            .entry(group.to_string())
            .or_default()
            .insert(model.to_string(), Ok(GeneratedResponse::default()));
        self
    }

    pub fn with_error(mut self, group: &str, model: &str, error: CollaboratorError) -> Self {
        self.outcomes
            .entry(group.to_string())
            .or_default()
            .insert(model.to_string(), Err(error));
        self
    }

    /// Fail the whole batch call for `group`.
    pub fn with_group_failure(mut self, group: &str, error: CollaboratorError) -> Self {
        self.failed_groups.insert(group.to_string(), error);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Configurations received, in call order.
    pub fn configs(&self) -> Vec<GenerationConfig> {
        self.configs.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResponseGenerator for StaticGenerator {
    async fn generate_all(&self, config: &GenerationConfig) -> CollaboratorResult<GroupOutcomes> {
        if let Ok(mut configs) = self.configs.lock() {
            configs.push(config.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failed_groups.get(&config.group_id) {
            return Err(err.clone());
        }

        let canned = self.outcomes.get(&config.group_id);
        let per_model: ModelOutcomes = config
            .models
            .iter()
            .filter_map(|model| {
                canned
                    .and_then(|m| m.get(model))
                    .map(|outcome| (model.clone(), outcome.clone()))
            })
            .collect();

        let mut groups = GroupOutcomes::new();
        groups.insert(config.group_id.clone(), per_model);
        Ok(groups)
    }
}

// ---------------------------------------------------------------------------
// StaticCoverage
// ---------------------------------------------------------------------------

/// Coverage judge double with fixed per-model scores.
#[derive(Debug, Default)]
pub struct StaticCoverage {
    scores: HashMap<String, CollaboratorResult<CoverageScore>>,
    batch_error: Option<CollaboratorError>,
    rubrics: Mutex<Vec<Vec<String>>>,
}

impl StaticCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, model: &str, avg_coverage_extent: f64) -> Self {
        self.scores.insert(
            model.to_string(),
            Ok(CoverageScore {
                avg_coverage_extent,
            }),
        );
        self
    }

    pub fn with_error(mut self, model: &str, error: CollaboratorError) -> Self {
        self.scores.insert(model.to_string(), Err(error));
        self
    }

    pub fn with_batch_failure(mut self, error: CollaboratorError) -> Self {
        self.batch_error = Some(error);
        self
    }

    /// Rubrics received, in call order.
    pub fn rubrics(&self) -> Vec<Vec<String>> {
        self.rubrics.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CoverageEvaluator for StaticCoverage {
    async fn evaluate(
        &self,
        _config: &GenerationConfig,
        candidates: &[CandidateItem],
        rubric: &[String],
    ) -> CollaboratorResult<HashMap<String, CollaboratorResult<CoverageScore>>> {
        if let Ok(mut rubrics) = self.rubrics.lock() {
            rubrics.push(rubric.to_vec());
        }
        if let Some(err) = &self.batch_error {
            return Err(err.clone());
        }
        Ok(candidates
            .iter()
            .filter_map(|c| {
                self.scores
                    .get(&c.model_id)
                    .map(|s| (c.model_id.clone(), s.clone()))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Embedders
// ---------------------------------------------------------------------------

/// Embedding double backed by a text -> vector table.
#[derive(Debug, Default)]
pub struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failures: HashMap<String, CollaboratorError>,
    calls: Mutex<Vec<String>>,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn with_failure(mut self, text: &str, error: CollaboratorError) -> Self {
        self.failures.insert(text.to_string(), error);
        self
    }

    /// Texts embedded, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.to_string());
        }
        if let Some(err) = self.failures.get(text) {
            return Err(err.clone());
        }
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| CollaboratorError::Failed(format!("no vector for text: {text}")))
    }
}

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of `dims` buckets.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn djb2(word: &str) -> u32 {
    let mut hash = 5381u32;
    for byte in word.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u32);
    }
    hash
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = djb2(&word.to_lowercase()) as usize % self.dims;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

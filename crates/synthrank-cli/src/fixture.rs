//! Offline replay fixtures: canned collaborator responses loaded from JSON.
//!
//! ```json
//! {
//!   "chat": { "compiler": "Write a summary.", "rubricator": "- point" },
//!   "candidates": { "model-a": "<draft>...</draft>", "model-b": { "error": "503" } },
//!   "anchors": { "anchor-1": "<draft>...</draft>" },
//!   "coverage": { "model-a": 0.9 },
//!   "embeddings": { "some text": [0.1, 0.2] }
//! }
//! ```
//!
//! Without an `embeddings` table texts are embedded with the deterministic
//! hashing embedder.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use synthrank_core::fakes::{
    HashingEmbedder, ScriptedChat, StaticCoverage, StaticGenerator, TableEmbedder,
};
use synthrank_core::{
    CollaboratorError, Embedder, RoundCollaborators, ANCHOR_GROUP, CANDIDATE_GROUP,
};

/// One canned model reply: raw text, or an error message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CannedResponse {
    Text(String),
    Error { error: String },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReplayFixture {
    /// Chat replies by model id (instruction and rubric models).
    #[serde(default)]
    pub chat: BTreeMap<String, CannedResponse>,

    #[serde(default)]
    pub candidates: BTreeMap<String, CannedResponse>,

    #[serde(default)]
    pub anchors: BTreeMap<String, CannedResponse>,

    /// Judge scores by candidate model id.
    #[serde(default)]
    pub coverage: BTreeMap<String, f64>,

    #[serde(default)]
    pub embeddings: Option<BTreeMap<String, Vec<f32>>>,

    /// Bucket count for the hashing embedder.
    #[serde(default)]
    pub embedding_dims: Option<usize>,
}

impl ReplayFixture {
    /// Build in-memory collaborators answering from this fixture.
    pub fn collaborators(&self) -> RoundCollaborators {
        let mut chat = ScriptedChat::new();
        for (model, reply) in &self.chat {
            chat = match reply {
                CannedResponse::Text(text) => chat.respond(model, text),
                CannedResponse::Error { error } => {
                    chat.fail(model, CollaboratorError::Failed(error.clone()))
                }
            };
        }

        let mut generator = StaticGenerator::new();
        for (group, replies) in [(CANDIDATE_GROUP, &self.candidates), (ANCHOR_GROUP, &self.anchors)]
        {
            for (model, reply) in replies {
                generator = match reply {
                    CannedResponse::Text(text) => generator.with_response(group, model, text),
                    CannedResponse::Error { error } => generator.with_error(
                        group,
                        model,
                        CollaboratorError::Failed(error.clone()),
                    ),
                };
            }
        }

        let coverage = self
            .coverage
            .iter()
            .fold(StaticCoverage::new(), |judge, (model, score)| {
                judge.with_score(model, *score)
            });

        let embedder: Arc<dyn Embedder> = match &self.embeddings {
            Some(table) => Arc::new(
                table
                    .iter()
                    .fold(TableEmbedder::new(), |e, (text, v)| e.with_vector(text, v.clone())),
            ),
            None => Arc::new(
                self.embedding_dims
                    .map(HashingEmbedder::new)
                    .unwrap_or_default(),
            ),
        };

        RoundCollaborators {
            chat: Arc::new(chat),
            generator: Arc::new(generator),
            coverage: Arc::new(coverage),
            embedder,
        }
    }
}

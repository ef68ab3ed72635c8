//! Embedding of source, anchors, and candidates into one vector space.
//!
//! Every distinct text is embedded once; all calls run concurrently and an
//! `embedding_progress` event is emitted as each one completes. A failed
//! embedding is left as `None` so the affected similarity terms are treated
//! as unavailable, not as zero.

use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;

use crate::collaborators::Embedder;
use crate::domain::{AnchorItem, CandidateItem, SoftFailure, Stage};
use crate::events::{RoundEvent, RoundEventKind, RoundEventSink};
use crate::similarity::similarity_terms;

/// Embeddings for one round, aligned with the anchor and candidate lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    pub source: Option<Vec<f32>>,
    pub anchors: Vec<Option<Vec<f32>>>,
    pub candidates: Vec<Option<Vec<f32>>>,
    pub failures: Vec<SoftFailure>,
}

enum Role {
    Source,
    Anchor(usize),
    Candidate(usize),
}

/// Embed every text the round needs.
pub async fn embed_round(
    embedder: &dyn Embedder,
    source_text: &str,
    anchors: &[AnchorItem],
    candidates: &[CandidateItem],
    sink: &dyn RoundEventSink,
) -> EmbeddingSet {
    // Distinct texts in first-seen order, each with the roles that use it.
    let mut unique: Vec<&str> = Vec::new();
    let mut users: Vec<Vec<(Role, String)>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    let roles = std::iter::once((source_text, Role::Source, "source".to_string()))
        .chain(
            anchors
                .iter()
                .enumerate()
                .map(|(i, a)| (a.text.as_str(), Role::Anchor(i), format!("anchor:{}", a.model_id))),
        )
        .chain(candidates.iter().enumerate().map(|(i, c)| {
            (
                c.text.as_str(),
                Role::Candidate(i),
                format!("candidate:{}", c.model_id),
            )
        }));

    for (text, role, label) in roles {
        let slot = *index.entry(text).or_insert_with(|| {
            unique.push(text);
            users.push(Vec::new());
            unique.len() - 1
        });
        users[slot].push((role, label));
    }

    let total = unique.len();
    let mut pending: FuturesUnordered<_> = unique
        .iter()
        .enumerate()
        .map(|(slot, text)| async move { (slot, embedder.embed(text).await) })
        .collect();

    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; total];
    let mut errors: Vec<Option<String>> = vec![None; total];
    let mut completed = 0usize;

    while let Some((slot, result)) = pending.next().await {
        completed += 1;
        match result {
            Ok(v) if v.is_empty() => errors[slot] = Some("embedding was empty".to_string()),
            Ok(v) if v.iter().any(|x| !x.is_finite()) => {
                errors[slot] = Some("embedding has non-finite components".to_string())
            }
            Ok(v) => vectors[slot] = Some(v),
            Err(e) => errors[slot] = Some(e.to_string()),
        }
        sink.emit(
            RoundEvent::new(RoundEventKind::EmbeddingProgress)
                .with_data(json!({ "completed": completed, "total": total })),
        )
        .await;
    }

    let mut set = EmbeddingSet {
        source: None,
        anchors: vec![None; anchors.len()],
        candidates: vec![None; candidates.len()],
        failures: Vec::new(),
    };
    for (slot, slot_users) in users.into_iter().enumerate() {
        for (role, label) in slot_users {
            if let Some(reason) = &errors[slot] {
                set.failures
                    .push(SoftFailure::new(Stage::Embedding, label, reason.clone()));
            }
            let vector = vectors[slot].clone();
            match role {
                Role::Source => set.source = vector,
                Role::Anchor(i) => set.anchors[i] = vector,
                Role::Candidate(i) => set.candidates[i] = vector,
            }
        }
    }
    set
}

/// Fill `sim_source`, `min_sim_anchors` and `norm_similarity` on every
/// candidate from the embedding set.
///
/// A candidate vector whose dimension differs from the source or an anchor
/// cannot be compared with it; each such pair is returned as a
/// [`SoftFailure`] and the term is left out.
pub fn apply_similarity(
    candidates: &mut [CandidateItem],
    anchors: &[AnchorItem],
    set: &EmbeddingSet,
) -> Vec<SoftFailure> {
    let anchor_vectors: Vec<(&str, &[f32])> = anchors
        .iter()
        .zip(set.anchors.iter())
        .filter_map(|(a, v)| v.as_deref().map(|v| (a.model_id.as_str(), v)))
        .collect();
    let anchor_slices: Vec<&[f32]> = anchor_vectors.iter().map(|(_, v)| *v).collect();
    let source = set.source.as_deref();
    let mut failures = Vec::new();

    for (candidate, vector) in candidates.iter_mut().zip(set.candidates.iter()) {
        if let Some(v) = vector.as_deref() {
            let label = format!("candidate:{}", candidate.model_id);
            let references = source
                .map(|s| ("source".to_string(), s))
                .into_iter()
                .chain(
                    anchor_vectors
                        .iter()
                        .map(|(id, a)| (format!("anchor:{id}"), *a)),
                );
            for (reference, r) in references {
                if r.len() != v.len() {
                    failures.push(SoftFailure::new(
                        Stage::Embedding,
                        &label,
                        format!(
                            "dimension {} does not match {reference} dimension {}",
                            v.len(),
                            r.len()
                        ),
                    ));
                }
            }
        }

        let terms = similarity_terms(vector.as_deref(), source, &anchor_slices);
        candidate.sim_source = terms.sim_source;
        candidate.min_sim_anchors = terms.min_sim_anchors;
        candidate.norm_similarity = terms.norm_similarity;
    }
    failures
}

//! Cosine similarity and the novelty-inverse blend used by the ranker.
//!
//! `norm_similarity` is the mean of the available terms (`sim_source`,
//! `min_sim_anchors`), clamped to [0, 1]. With no anchors it is
//! `sim_source` alone; if the source embedding is missing it is
//! `min_sim_anchors` alone. A candidate without its own embedding gets no
//! terms at all and cannot be ranked.

use serde::{Deserialize, Serialize};

/// Standard cosine similarity. Zero-norm inputs and mismatched lengths
/// yield `0.0`, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    checked_cosine(a, b).unwrap_or(0.0)
}

/// Cosine similarity, `None` when the vectors are empty, differ in length,
/// or hold non-finite components.
pub fn checked_cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return None;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    sim.is_finite().then_some(sim)
}

/// Similarity terms derived for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTerms {
    pub sim_source: Option<f64>,
    pub min_sim_anchors: Option<f64>,
    pub norm_similarity: Option<f64>,
}

/// Derive the similarity terms for a candidate embedding.
///
/// Anchors whose vectors are unusable against the candidate are skipped
/// rather than counted as zero similarity.
pub fn similarity_terms(
    candidate: Option<&[f32]>,
    source: Option<&[f32]>,
    anchors: &[&[f32]],
) -> SimilarityTerms {
    let Some(candidate) = candidate else {
        return SimilarityTerms::default();
    };

    let sim_source = source.and_then(|s| checked_cosine(candidate, s));
    let min_sim_anchors = anchors
        .iter()
        .filter_map(|a| checked_cosine(candidate, a))
        .fold(None, |min: Option<f64>, sim| {
            Some(min.map_or(sim, |m| m.min(sim)))
        });

    SimilarityTerms {
        sim_source,
        min_sim_anchors,
        norm_similarity: normalize(sim_source, min_sim_anchors),
    }
}

/// Blend the available terms into a single [0, 1] value.
pub fn normalize(sim_source: Option<f64>, min_sim_anchors: Option<f64>) -> Option<f64> {
    let terms: Vec<f64> = [sim_source, min_sim_anchors].into_iter().flatten().collect();
    if terms.is_empty() {
        return None;
    }
    let mean = terms.iter().sum::<f64>() / terms.len() as f64;
    Some(mean.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(approx(cosine_similarity(&v, &v), 1.0));
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn test_opposite_vectors() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0));
    }

    #[test]
    fn test_zero_norm_is_zero_not_nan() {
        let sim = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]);
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_mismatched_lengths() {
        assert_eq!(checked_cosine(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(checked_cosine(&[], &[]), None);
    }

    #[test]
    fn test_non_finite_components_have_no_similarity() {
        assert_eq!(checked_cosine(&[f32::NAN, 0.0], &[1.0, 0.0]), None);
        assert_eq!(checked_cosine(&[1.0, 0.0], &[f32::INFINITY, 1.0]), None);
        assert_eq!(cosine_similarity(&[f32::NAN, 0.0], &[1.0, 0.0]), 0.0);

        let cand: &[f32] = &[f32::NAN, 0.0];
        let source: &[f32] = &[1.0, 0.0];
        let terms = similarity_terms(Some(cand), Some(source), &[]);
        assert_eq!(terms.norm_similarity, None);
    }

    #[test]
    fn test_min_over_anchors() {
        let cand: &[f32] = &[1.0, 0.0];
        let source: &[f32] = &[1.0, 0.0];
        let near: &[f32] = &[1.0, 0.1];
        let far: &[f32] = &[0.0, 1.0];
        let terms = similarity_terms(Some(cand), Some(source), &[near, far]);
        assert!(approx(terms.min_sim_anchors.unwrap(), 0.0));
        assert!(approx(terms.sim_source.unwrap(), 1.0));
        assert!(approx(terms.norm_similarity.unwrap(), 0.5));
    }

    #[test]
    fn test_no_anchors_falls_back_to_source() {
        let cand: &[f32] = &[1.0, 1.0];
        let source: &[f32] = &[1.0, 0.0];
        let terms = similarity_terms(Some(cand), Some(source), &[]);
        assert_eq!(terms.min_sim_anchors, None);
        assert!(approx(
            terms.norm_similarity.unwrap(),
            terms.sim_source.unwrap()
        ));
    }

    #[test]
    fn test_missing_source_uses_anchors_only() {
        let cand: &[f32] = &[1.0, 1.0];
        let anchor: &[f32] = &[0.0, 1.0];
        let terms = similarity_terms(Some(cand), None, &[anchor]);
        assert_eq!(terms.sim_source, None);
        assert!(approx(
            terms.norm_similarity.unwrap(),
            terms.min_sim_anchors.unwrap()
        ));
    }

    #[test]
    fn test_missing_candidate_embedding_has_no_terms() {
        let source: &[f32] = &[1.0];
        let terms = similarity_terms(None, Some(source), &[]);
        assert_eq!(terms, SimilarityTerms::default());
    }

    #[test]
    fn test_normalize_clamps_negative() {
        assert_eq!(normalize(Some(-0.8), Some(-0.2)), Some(0.0));
        assert_eq!(normalize(None, None), None);
    }

    #[test]
    fn test_higher_similarity_means_higher_norm() {
        let low = normalize(Some(0.2), Some(0.3)).unwrap();
        let high = normalize(Some(0.9), Some(0.3)).unwrap();
        assert!(high > low);
    }
}

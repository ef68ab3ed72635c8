//! Candidate ranking.
//!
//! Composite mode scalarizes `(coverage, norm_similarity)`:
//!
//! ```text
//! rank_score = w * (1 - coverage) + (1 - w) * norm_similarity   (lower is better)
//! ```
//!
//! Pareto mode orders by non-dominated front (maximize coverage, minimize
//! norm_similarity) and breaks ties within a front by composite score.
//! Winners are drawn front by front until `top_n` is filled.
//!
//! Ranking is a pure function over [`CandidateItem`]s so saved bundles can be
//! re-ranked with different options.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::artifacts::redact_candidates;
use crate::domain::params::{check_unit, invalid};
use crate::domain::{CandidateItem, RankMode, Result, RoundArtifacts, RoundParameters};

/// The subset of round parameters the ranker reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankOptions {
    pub mode: RankMode,
    pub coverage_weight: f64,
    pub use_gate: bool,
    pub coverage_threshold: f64,
    pub top_n: usize,
}

impl RankOptions {
    pub fn from_params(params: &RoundParameters) -> Self {
        Self {
            mode: params.rank_mode,
            coverage_weight: params.coverage_weight,
            use_gate: params.use_gate,
            coverage_threshold: params.coverage_threshold,
            top_n: params.top_n,
        }
    }

    /// Reject weights or thresholds outside [0, 1] and a zero `top_n`.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(invalid("top_n must be at least 1"));
        }
        check_unit("coverage_weight", self.coverage_weight)?;
        check_unit("coverage_threshold", self.coverage_threshold)
    }
}

/// Result of ranking a candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct RankOutcome {
    /// Input order, with `rank_score`, `gated_out` and `pareto_front` filled in.
    pub scored: Vec<CandidateItem>,
    /// Eligible candidates in rank order, then gated-out ones by score, then
    /// unrankable ones in input order.
    pub sorted: Vec<CandidateItem>,
    /// The first `top_n` eligible candidates.
    pub winners: Vec<CandidateItem>,
    /// Number of candidates that passed the gate with both ranking inputs.
    pub eligible: usize,
}

/// Composite objective; lower is better.
pub fn composite_score(coverage: f64, norm_similarity: f64, coverage_weight: f64) -> f64 {
    coverage_weight * (1.0 - coverage) + (1.0 - coverage_weight) * norm_similarity
}

/// `a` is at least as good as `b` on both objectives and strictly better on one.
fn dominates(a: (f64, f64), b: (f64, f64)) -> bool {
    let (cov_a, sim_a) = a;
    let (cov_b, sim_b) = b;
    cov_a >= cov_b && sim_a <= sim_b && (cov_a > cov_b || sim_a < sim_b)
}

/// Assign a 0-based non-dominated front index to each point.
pub fn pareto_fronts(points: &[(f64, f64)]) -> Vec<usize> {
    let mut fronts = vec![usize::MAX; points.len()];
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut front = 0;

    while !remaining.is_empty() {
        let current: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                !remaining
                    .iter()
                    .any(|&j| j != i && dominates(points[j], points[i]))
            })
            .collect();
        for &i in &current {
            fronts[i] = front;
        }
        remaining.retain(|i| !current.contains(i));
        front += 1;
    }
    fronts
}

fn by_score(a: &CandidateItem, b: &CandidateItem) -> Ordering {
    let sa = a.rank_score.unwrap_or(f64::INFINITY);
    let sb = b.rank_score.unwrap_or(f64::INFINITY);
    sa.total_cmp(&sb)
}

/// Score, gate, and order `candidates`.
pub fn rank_candidates(candidates: &[CandidateItem], options: &RankOptions) -> RankOutcome {
    let mut scored: Vec<CandidateItem> = candidates
        .iter()
        .cloned()
        .map(|mut c| {
            c.rank_score = match (c.coverage, c.norm_similarity) {
                (Some(cov), Some(sim)) => Some(composite_score(cov, sim, options.coverage_weight)),
                _ => None,
            };
            c.gated_out = options.use_gate
                && c.coverage.is_some_and(|cov| cov < options.coverage_threshold);
            c.pareto_front = None;
            c
        })
        .collect();

    let eligible_idx: Vec<usize> = scored
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_rankable() && !c.gated_out)
        .map(|(i, _)| i)
        .collect();

    if options.mode == RankMode::Pareto {
        let points: Vec<(f64, f64)> = eligible_idx
            .iter()
            .map(|&i| {
                let c = &scored[i];
                (
                    c.coverage.unwrap_or(0.0),
                    c.norm_similarity.unwrap_or(1.0),
                )
            })
            .collect();
        for (k, front) in pareto_fronts(&points).into_iter().enumerate() {
            scored[eligible_idx[k]].pareto_front = Some(front);
        }
    }

    let mut eligible: Vec<CandidateItem> =
        eligible_idx.iter().map(|&i| scored[i].clone()).collect();
    match options.mode {
        // `sort_by` is stable: ties keep input order.
        RankMode::Composite => eligible.sort_by(by_score),
        RankMode::Pareto => eligible.sort_by(|a, b| {
            a.pareto_front
                .cmp(&b.pareto_front)
                .then_with(|| by_score(a, b))
        }),
    }

    let mut gated: Vec<CandidateItem> = scored
        .iter()
        .filter(|c| c.is_rankable() && c.gated_out)
        .cloned()
        .collect();
    gated.sort_by(by_score);

    let unrankable = scored.iter().filter(|c| !c.is_rankable()).cloned();

    let winners: Vec<CandidateItem> = eligible.iter().take(options.top_n).cloned().collect();
    let eligible_count = eligible.len();

    let mut sorted = eligible;
    sorted.extend(gated);
    sorted.extend(unrankable);

    RankOutcome {
        scored,
        sorted,
        winners,
        eligible: eligible_count,
    }
}

/// Re-rank a saved bundle with different options.
///
/// The copy records `options` in its parameters so the bundle stays
/// self-describing; texts, similarities and coverage are untouched.
pub fn rerank_artifacts(
    artifacts: &RoundArtifacts,
    options: &RankOptions,
) -> Result<RoundArtifacts> {
    options.validate()?;
    let outcome = rank_candidates(&artifacts.candidates, options);
    let mut out = artifacts.clone();
    out.params.rank_mode = options.mode;
    out.params.coverage_weight = options.coverage_weight;
    out.params.use_gate = options.use_gate;
    out.params.coverage_threshold = options.coverage_threshold;
    out.params.top_n = options.top_n;

    out.top_candidates = if out.params.redact_transport {
        redact_candidates(&outcome.winners)
    } else {
        outcome.winners.clone()
    };
    out.candidates = outcome.scored;
    out.candidates_sorted = outcome.sorted;
    out.winners = outcome.winners;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(mode: RankMode, top_n: usize) -> RankOptions {
        RankOptions {
            mode,
            coverage_weight: 0.7,
            use_gate: false,
            coverage_threshold: 0.8,
            top_n,
        }
    }

    fn cand(id: &str, coverage: f64, sim: f64) -> CandidateItem {
        CandidateItem::new(id, format!("text of {id}"))
            .with_coverage(coverage)
            .with_norm_similarity(sim)
    }

    #[test]
    fn test_lower_similarity_ranks_better_at_equal_coverage() {
        let a = composite_score(0.8, 0.3, 0.7);
        let b = composite_score(0.8, 0.6, 0.7);
        assert!(a < b);
    }

    #[test]
    fn test_higher_coverage_ranks_better_at_equal_similarity() {
        let a = composite_score(0.9, 0.5, 0.7);
        let b = composite_score(0.6, 0.5, 0.7);
        assert!(a < b);
    }

    #[test]
    fn test_composite_sorts_ascending() {
        let out = rank_candidates(
            &[cand("a", 0.5, 0.9), cand("b", 0.9, 0.2), cand("c", 0.7, 0.5)],
            &opts(RankMode::Composite, 2),
        );
        let order: Vec<&str> = out.sorted.iter().map(|c| c.model_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(out.winners.len(), 2);
        assert_eq!(out.winners[0].model_id, "b");
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let out = rank_candidates(
            &[cand("first", 0.8, 0.4), cand("second", 0.8, 0.4)],
            &opts(RankMode::Composite, 2),
        );
        assert_eq!(out.winners[0].model_id, "first");
        assert_eq!(out.winners[1].model_id, "second");
    }

    #[test]
    fn test_gate_excludes_low_coverage_even_if_most_novel() {
        let mut options = opts(RankMode::Composite, 3);
        options.use_gate = true;
        options.coverage_threshold = 0.8;
        let out = rank_candidates(
            &[cand("novel", 0.7, 0.0), cand("solid", 0.85, 0.9)],
            &options,
        );
        assert!(out.winners.iter().all(|w| w.model_id != "novel"));
        assert_eq!(out.eligible, 1);
        // Gated candidates keep their score and trail the eligible ones.
        let last = out.sorted.last().unwrap();
        assert_eq!(last.model_id, "novel");
        assert!(last.gated_out);
        assert!(last.rank_score.is_some());
    }

    #[test]
    fn test_unscored_candidates_never_win() {
        let unscored = CandidateItem::new("judge-failed", "x").with_norm_similarity(0.0);
        let out = rank_candidates(
            &[unscored, cand("ok", 0.5, 0.5)],
            &opts(RankMode::Composite, 5),
        );
        assert_eq!(out.winners.len(), 1);
        assert_eq!(out.winners[0].model_id, "ok");
        assert_eq!(out.sorted.len(), 2);
        assert_eq!(out.sorted[1].model_id, "judge-failed");
        assert_eq!(out.scored[0].rank_score, None);
    }

    #[test]
    fn test_top_n_bounded_by_available() {
        for top_n in 1..5 {
            let out = rank_candidates(
                &[cand("a", 0.9, 0.1), cand("b", 0.8, 0.2)],
                &opts(RankMode::Composite, top_n),
            );
            assert_eq!(out.winners.len(), top_n.min(2));
        }
    }

    #[test]
    fn test_scored_keeps_input_order() {
        let out = rank_candidates(
            &[cand("a", 0.1, 0.9), cand("b", 0.9, 0.1)],
            &opts(RankMode::Composite, 1),
        );
        assert_eq!(out.scored[0].model_id, "a");
        assert_eq!(out.scored[1].model_id, "b");
        assert!(out.scored.iter().all(|c| c.rank_score.is_some()));
    }

    #[test]
    fn test_pareto_fronts() {
        // a and b are mutually non-dominated; c is dominated by b.
        let fronts = pareto_fronts(&[(0.9, 0.8), (0.7, 0.2), (0.6, 0.3)]);
        assert_eq!(fronts, vec![0, 0, 1]);
    }

    #[test]
    fn test_pareto_prefers_first_front_then_composite() {
        // "balanced" dominates "dominated", which therefore trails front 0.
        let candidates = [
            cand("dominated", 0.80, 0.30),
            cand("high-cov", 0.95, 0.90),
            cand("balanced", 0.85, 0.25),
        ];
        let out = rank_candidates(&candidates, &opts(RankMode::Pareto, 3));
        let order: Vec<&str> = out.sorted.iter().map(|c| c.model_id.as_str()).collect();
        assert_eq!(order, vec!["balanced", "high-cov", "dominated"]);
        assert_eq!(out.sorted[0].pareto_front, Some(0));
        assert_eq!(out.sorted[1].pareto_front, Some(0));
        assert_eq!(out.sorted[2].pareto_front, Some(1));
    }

    #[test]
    fn test_pareto_draws_from_later_fronts_to_fill_top_n() {
        let candidates = [cand("best", 0.9, 0.1), cand("worse", 0.5, 0.5)];
        let out = rank_candidates(&candidates, &opts(RankMode::Pareto, 2));
        assert_eq!(out.winners.len(), 2);
        assert_eq!(out.winners[1].pareto_front, Some(1));
    }

    #[test]
    fn test_composite_mode_leaves_front_unset() {
        let out = rank_candidates(&[cand("a", 0.5, 0.5)], &opts(RankMode::Composite, 1));
        assert_eq!(out.winners[0].pareto_front, None);
    }

    #[test]
    fn test_rerank_resets_previous_flags() {
        let mut gated = cand("a", 0.5, 0.5);
        gated.gated_out = true;
        gated.pareto_front = Some(3);
        let out = rank_candidates(&[gated], &opts(RankMode::Composite, 1));
        assert!(!out.winners[0].gated_out);
        assert_eq!(out.winners[0].pareto_front, None);
    }

    #[test]
    fn test_rerank_artifacts_updates_winners_and_params() {
        use chrono::Utc;
        use uuid::Uuid;

        let params = RoundParameters::new("src", "i", "r", "j", vec!["a".into(), "b".into()]);
        let first = rank_candidates(
            &[cand("a", 0.9, 0.9), cand("b", 0.6, 0.1)],
            &RankOptions::from_params(&params),
        );
        let bundle = RoundArtifacts {
            round_id: Uuid::new_v4(),
            source_digest: params.source_digest(),
            instruction_set: "inst".into(),
            coverage_points: vec!["p".into()],
            anchors: Vec::new(),
            candidates: first.scored,
            candidates_sorted: first.sorted,
            winners: first.winners.clone(),
            top_candidates: first.winners,
            warnings: Vec::new(),
            params,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(bundle.winners[0].model_id, "b");

        let mut gated = opts(RankMode::Composite, 1);
        gated.use_gate = true;
        let out = rerank_artifacts(&bundle, &gated).unwrap();
        assert_eq!(out.winners[0].model_id, "a");
        assert_eq!(out.top_candidates, out.winners);
        assert!(out.params.use_gate);
        assert_eq!(out.round_id, bundle.round_id);

        let mut heavy = opts(RankMode::Composite, 1);
        heavy.coverage_weight = 1.5;
        let err = rerank_artifacts(&bundle, &heavy).unwrap_err();
        assert!(err.to_string().contains("coverage_weight"));
    }

    #[test]
    fn test_options_validate_bounds() {
        assert!(opts(RankMode::Composite, 1).validate().is_ok());

        let err = opts(RankMode::Composite, 0).validate().unwrap_err();
        assert!(err.to_string().contains("top_n"));

        let mut o = opts(RankMode::Pareto, 1);
        o.coverage_threshold = -0.1;
        assert!(o.validate().unwrap_err().to_string().contains("coverage_threshold"));

        o.coverage_threshold = f64::NAN;
        assert!(o.validate().is_err());
    }
}

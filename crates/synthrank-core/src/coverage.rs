//! Rubric coverage scoring for the candidate group.

use tracing::debug;

use crate::collaborators::{CoverageEvaluator, GenerationConfig};
use crate::domain::{CandidateItem, SoftFailure, Stage};

/// Ask the judge to score every candidate in one batch and write the
/// results into `candidates`. Candidates without a usable score keep
/// `coverage = None`; each such miss is returned as a [`SoftFailure`].
pub async fn score_candidates(
    evaluator: &dyn CoverageEvaluator,
    config: &GenerationConfig,
    candidates: &mut [CandidateItem],
    rubric: &[String],
) -> Vec<SoftFailure> {
    let scores = match evaluator.evaluate(config, candidates, rubric).await {
        Ok(scores) => scores,
        Err(e) => {
            return candidates
                .iter()
                .map(|c| {
                    SoftFailure::new(Stage::Coverage, &c.model_id, format!("batch failed: {e}"))
                })
                .collect();
        }
    };

    let mut failures = Vec::new();
    for candidate in candidates.iter_mut() {
        candidate.coverage = None;
        match scores.get(&candidate.model_id) {
            Some(Ok(score)) if score.avg_coverage_extent.is_finite() => {
                candidate.coverage = Some(score.avg_coverage_extent.clamp(0.0, 1.0));
            }
            Some(Ok(score)) => failures.push(SoftFailure::new(
                Stage::Coverage,
                &candidate.model_id,
                format!("non-finite coverage {}", score.avg_coverage_extent),
            )),
            Some(Err(e)) => failures.push(SoftFailure::new(
                Stage::Coverage,
                &candidate.model_id,
                e.to_string(),
            )),
            None => failures.push(SoftFailure::new(
                Stage::Coverage,
                &candidate.model_id,
                "judge returned no score",
            )),
        }
    }

    debug!(
        scored = candidates.iter().filter(|c| c.coverage.is_some()).count(),
        missing = failures.len(),
        "coverage scoring finished"
    );
    failures
}

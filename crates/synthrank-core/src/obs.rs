//! Structured observability hooks for the round lifecycle.
//!
//! Events are emitted at `info!` level (warn for failures) with an
//! `event = "round.*"` field. Response texts are never logged in full.

use tracing::{info, warn};

use crate::domain::{preview, SoftFailure, Stage};

/// Emit event: round started.
pub fn emit_round_started(round_id: &str, candidates: usize, anchors: usize) {
    info!(
        event = "round.started",
        round_id = %round_id,
        candidate_models = candidates,
        anchor_models = anchors,
    );
}

/// Emit event: one stage finished.
pub fn emit_stage_finished(round_id: &str, stage: Stage, duration_ms: u64) {
    info!(
        event = "round.stage_finished",
        round_id = %round_id,
        stage = %stage,
        duration_ms = duration_ms,
    );
}

/// Emit event: a unit of work was dropped (warning level).
pub fn emit_soft_failure(round_id: &str, failure: &SoftFailure) {
    warn!(
        event = "round.soft_failure",
        round_id = %round_id,
        stage = %failure.stage,
        subject = %failure.subject,
        reason = %preview(&failure.reason),
    );
}

/// Emit event: round completed.
pub fn emit_round_finished(round_id: &str, duration_ms: u64, candidates: usize, winners: usize) {
    info!(
        event = "round.finished",
        round_id = %round_id,
        duration_ms = duration_ms,
        candidates = candidates,
        winners = winners,
    );
}

/// Emit event: round aborted (warning level).
pub fn emit_round_failed(round_id: &str, stage: Stage, error: &dyn std::fmt::Display) {
    warn!(event = "round.failed", round_id = %round_id, stage = %stage, error = %error);
}

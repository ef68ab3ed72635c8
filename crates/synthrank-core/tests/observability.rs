//! Observability tests for the round lifecycle.
//!
//! These tests verify that the structured tracing hooks and counters are
//! exercised on the success and failure paths without panicking.

use std::sync::Arc;

use synthrank_core::fakes::{HashingEmbedder, ScriptedChat, StaticCoverage, StaticGenerator};
use synthrank_core::metrics::METRICS;
use synthrank_core::obs::{
    emit_round_failed, emit_round_finished, emit_round_started, emit_soft_failure,
    emit_stage_finished,
};
use synthrank_core::{
    DefaultConfigBuilder, NullSink, RetryPolicy, RoundCollaborators, RoundParameters, RoundRunner,
    RunnerConfig, SoftFailure, Stage, CANDIDATE_GROUP,
};
use tracing_test::traced_test;

fn runner(generator: StaticGenerator) -> RoundRunner {
    RoundRunner::new(
        RoundCollaborators {
            chat: Arc::new(
                ScriptedChat::new()
                    .respond("compiler", "Summarize it.")
                    .respond("rubricator", "- keeps the facts"),
            ),
            generator: Arc::new(generator),
            coverage: Arc::new(StaticCoverage::new().with_score("c1", 0.8)),
            embedder: Arc::new(HashingEmbedder::default()),
        },
        RunnerConfig::default().with_retry(RetryPolicy::none()),
    )
}

fn params() -> RoundParameters {
    RoundParameters::new(
        "Rust guarantees memory safety without a garbage collector.",
        "compiler",
        "rubricator",
        "judge",
        vec!["c1".to_string()],
    )
}

/// Test: emit_round_started creates an info-level event
#[traced_test]
#[test]
fn test_emit_round_started_logs_counts() {
    emit_round_started("round-123", 3, 2);
}

/// Test: emit_stage_finished creates an info-level event
#[traced_test]
#[test]
fn test_emit_stage_finished_logs_duration() {
    emit_stage_finished("round-123", Stage::Embedding, 42);
}

/// Test: emit_soft_failure creates a warn-level event with a previewed reason
#[traced_test]
#[test]
fn test_emit_soft_failure_logs_warning() {
    let failure = SoftFailure::new(Stage::Generation, "c2", "x".repeat(1000));
    emit_soft_failure("round-err-001", &failure);
}

/// Test: emit_round_finished / emit_round_failed do not panic
#[traced_test]
#[test]
fn test_emit_round_terminal_events() {
    emit_round_finished("round-456", 5000, 4, 1);
    emit_round_failed("round-789", Stage::Assertions, &"rubric was empty");
}

/// Test: a completed round bumps the started/completed counters
#[traced_test]
#[tokio::test]
async fn test_completed_round_updates_counters() {
    let started = METRICS.rounds_started();
    let completed = METRICS.rounds_completed();
    let ranked = METRICS.candidates_ranked();

    let generator = StaticGenerator::new().with_response(CANDIDATE_GROUP, "c1", "<draft>ok</draft>");
    runner(generator)
        .run_round(&params(), &DefaultConfigBuilder, &NullSink)
        .await
        .expect("round completes");

    // Counters are process-global; other tests may run concurrently.
    assert!(METRICS.rounds_started() > started);
    assert!(METRICS.rounds_completed() > completed);
    assert!(METRICS.candidates_ranked() > ranked);
}

/// Test: a failed round bumps the failure counters
#[traced_test]
#[tokio::test]
async fn test_failed_round_updates_counters() {
    let failed = METRICS.rounds_failed();
    let soft = METRICS.soft_failures();

    let generator = StaticGenerator::new().with_empty_response(CANDIDATE_GROUP, "c1");
    let result = runner(generator)
        .run_round(&params(), &DefaultConfigBuilder, &NullSink)
        .await;

    assert!(result.is_err());
    assert!(METRICS.rounds_failed() > failed);
    assert!(METRICS.soft_failures() > soft);
}

//! Round orchestration.
//!
//! Stages run strictly in sequence:
//!
//! ```text
//! start -> instruction -> assertions -> generation (candidates || anchors)
//!       -> coverage -> embedding (source || anchors || candidates)
//!       -> ranking -> completed
//! ```
//!
//! Each stage emits `{stage}_started` / `{stage}_finished`; generation,
//! coverage and embedding also emit `_progress` events. Every event is sent
//! from the task driving the round, so stage order holds even while model
//! calls fan out. A fatal error emits a single `error` event tagged with its
//! stage and no `completed` event follows.

use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::collaborators::{ConfigBuilder, RoundCollaborators};
use crate::coverage::score_candidates;
use crate::domain::artifacts::redact_candidates;
use crate::domain::{
    AnchorItem, CandidateItem, Result, RoundArtifacts, RoundError, RoundParameters, SoftFailure,
    Stage,
};
use crate::embedding::{apply_similarity, embed_round};
use crate::events::{RoundEvent, RoundEventKind, RoundEventSink};
use crate::generation::{generate_group, GroupGeneration};
use crate::metrics::METRICS;
use crate::obs;
use crate::rank::{rank_candidates, RankOptions};
use crate::synth::{synthesize_instruction, synthesize_rubric, RetryPolicy};

/// Orchestrator settings that are not part of a round's parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Retry policy for instruction and rubric synthesis.
    pub retry: RetryPolicy,
}

impl RunnerConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Runs synthesis-and-ranking rounds against injected collaborators.
///
/// Holds no per-round state: concurrent calls to [`RoundRunner::run_round`]
/// are independent.
#[derive(Clone)]
pub struct RoundRunner {
    collaborators: RoundCollaborators,
    config: RunnerConfig,
}

/// Per-round bookkeeping, owned by the driving task.
struct RoundContext<'a> {
    round_id: String,
    sink: &'a dyn RoundEventSink,
    cancel: CancelSignal,
    warnings: Vec<String>,
    stage_clock: Instant,
}

impl RoundContext<'_> {
    async fn start(&mut self, stage: Stage) {
        if let Some(kind) = RoundEventKind::started(stage) {
            self.sink.emit(RoundEvent::new(kind)).await;
        }
        self.stage_clock = Instant::now();
    }

    async fn finish(&mut self, stage: Stage, data: serde_json::Value) {
        if let Some(kind) = RoundEventKind::finished(stage) {
            self.sink.emit(RoundEvent::new(kind).with_data(data)).await;
        }
        obs::emit_stage_finished(
            &self.round_id,
            stage,
            self.stage_clock.elapsed().as_millis() as u64,
        );
    }

    async fn progress(&mut self, stage: Stage, data: serde_json::Value) {
        if let Some(kind) = RoundEventKind::progress(stage) {
            self.sink.emit(RoundEvent::new(kind).with_data(data)).await;
        }
    }

    async fn warn_all(&mut self, failures: Vec<SoftFailure>) {
        METRICS.add_soft_failures(failures.len() as u64);
        for failure in failures {
            obs::emit_soft_failure(&self.round_id, &failure);
            let message = failure.to_string();
            self.sink
                .emit(RoundEvent::warning(failure.stage, message.clone()))
                .await;
            self.warnings.push(message);
        }
    }

    /// Race `fut` against cancellation. Dropping `fut` aborts its in-flight calls.
    async fn guard<T>(&mut self, stage: Stage, fut: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RoundError::Cancelled { stage }),
            out = fut => Ok(out),
        }
    }
}

impl RoundRunner {
    pub fn new(collaborators: RoundCollaborators, config: RunnerConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Run one round to completion.
    ///
    /// Returns the artifacts also carried by the terminal `completed` event,
    /// or the fatal error also reported by the terminal `error` event.
    pub async fn run_round(
        &self,
        params: &RoundParameters,
        builder: &dyn ConfigBuilder,
        sink: &dyn RoundEventSink,
    ) -> Result<RoundArtifacts> {
        self.run_round_with_cancel(params, builder, sink, CancelSignal::never())
            .await
    }

    /// Like [`RoundRunner::run_round`], aborting with
    /// [`RoundError::Cancelled`] once `cancel` fires.
    pub async fn run_round_with_cancel(
        &self,
        params: &RoundParameters,
        builder: &dyn ConfigBuilder,
        sink: &dyn RoundEventSink,
        cancel: CancelSignal,
    ) -> Result<RoundArtifacts> {
        let round_id = Uuid::new_v4();
        let span = info_span!("synthrank.round", round_id = %round_id);
        self.drive(round_id, params, builder, sink, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        round_id: Uuid,
        params: &RoundParameters,
        builder: &dyn ConfigBuilder,
        sink: &dyn RoundEventSink,
        cancel: CancelSignal,
    ) -> Result<RoundArtifacts> {
        let clock = Instant::now();
        let mut ctx = RoundContext {
            round_id: round_id.to_string(),
            sink,
            cancel,
            warnings: Vec::new(),
            stage_clock: clock,
        };
        METRICS.inc_rounds_started();
        obs::emit_round_started(
            &ctx.round_id,
            params.candidate_models.len(),
            params.anchor_models.len(),
        );

        let outcome = match self.execute(&mut ctx, round_id, params, builder).await {
            Ok(artifacts) => serde_json::to_value(&artifacts)
                .map(|value| (artifacts, value))
                .map_err(RoundError::from),
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok((artifacts, value)) => {
                sink.emit(
                    RoundEvent::new(RoundEventKind::Completed)
                        .with_message(format!("{} winner(s) selected", artifacts.winners.len()))
                        .with_data(json!({ "artifacts": value })),
                )
                .await;
                METRICS.inc_rounds_completed();
                METRICS.add_candidates_ranked(artifacts.candidates.len() as u64);
                obs::emit_round_finished(
                    &ctx.round_id,
                    clock.elapsed().as_millis() as u64,
                    artifacts.candidates.len(),
                    artifacts.winners.len(),
                );
                Ok(artifacts)
            }
            Err(e) => {
                sink.emit(RoundEvent::error(e.stage(), e.to_string())).await;
                METRICS.inc_rounds_failed();
                obs::emit_round_failed(&ctx.round_id, e.stage(), &e);
                Err(e)
            }
        };
        METRICS.flush();
        result
    }

    async fn execute(
        &self,
        ctx: &mut RoundContext<'_>,
        round_id: Uuid,
        params: &RoundParameters,
        builder: &dyn ConfigBuilder,
    ) -> Result<RoundArtifacts> {
        params.validate()?;
        let started_at = Utc::now();
        let chat = self.collaborators.chat.as_ref();
        let retry = self.config.retry;

        // -- instruction ---------------------------------------------------
        ctx.start(Stage::Instruction).await;
        let instruction_set = ctx
            .guard(
                Stage::Instruction,
                synthesize_instruction(
                    chat,
                    &params.source_text,
                    &params.instruction_model,
                    params.synthesis_temperature,
                    retry,
                ),
            )
            .await??;
        ctx.finish(
            Stage::Instruction,
            json!({ "instruction_set": instruction_set }),
        )
        .await;

        // -- rubric ----------------------------------------------------------
        ctx.start(Stage::Assertions).await;
        let coverage_points = ctx
            .guard(
                Stage::Assertions,
                synthesize_rubric(
                    chat,
                    &params.source_text,
                    &params.rubric_model,
                    params.synthesis_temperature,
                    retry,
                ),
            )
            .await??;
        ctx.finish(
            Stage::Assertions,
            json!({ "count": coverage_points.len(), "coverage_points": coverage_points }),
        )
        .await;

        // -- generation ------------------------------------------------------
        ctx.start(Stage::Generation).await;
        let candidate_config =
            builder.build_candidate_config(params, &instruction_set, &coverage_points);
        let anchor_config = builder.build_anchor_config(params, &params.source_text);
        let generator = self.collaborators.generator.as_ref();
        let sink = ctx.sink;

        let (candidate_gen, anchor_gen) = ctx
            .guard(Stage::Generation, async {
                let mut pending: FuturesUnordered<_> = [&candidate_config, &anchor_config]
                    .into_iter()
                    .enumerate()
                    .map(|(slot, config)| async move { (slot, generate_group(generator, config).await) })
                    .collect();
                let mut groups: [GroupGeneration; 2] = Default::default();
                while let Some((slot, group)) = pending.next().await {
                    sink.emit(
                        RoundEvent::new(RoundEventKind::GenerationProgress).with_data(json!({
                            "group": group.group_id,
                            "drafts": group.drafts.len(),
                            "failed": group.failures.len(),
                        })),
                    )
                    .await;
                    groups[slot] = group;
                }
                let [candidates, anchors] = groups;
                (candidates, anchors)
            })
            .await?;

        ctx.warn_all(candidate_gen.failures).await;
        ctx.warn_all(anchor_gen.failures).await;

        let mut candidates: Vec<CandidateItem> = candidate_gen
            .drafts
            .into_iter()
            .map(|d| CandidateItem::new(d.model_id, d.text))
            .collect();
        let anchors: Vec<AnchorItem> = anchor_gen
            .drafts
            .into_iter()
            .map(|d| AnchorItem {
                model_id: d.model_id,
                text: d.text,
            })
            .collect();

        if candidates.is_empty() {
            return Err(RoundError::NoCandidates);
        }
        if anchors.is_empty() && !anchor_config.models.is_empty() {
            ctx.warn_all(vec![SoftFailure::new(
                Stage::Generation,
                "anchors",
                "no anchor responses survived; novelty uses source similarity only",
            )])
            .await;
        }
        ctx.finish(
            Stage::Generation,
            json!({ "candidates": candidates.len(), "anchors": anchors.len() }),
        )
        .await;

        // -- coverage --------------------------------------------------------
        ctx.start(Stage::Coverage).await;
        let judge = self.collaborators.coverage.as_ref();
        let coverage_failures = ctx
            .guard(
                Stage::Coverage,
                score_candidates(judge, &candidate_config, &mut candidates, &coverage_points),
            )
            .await?;
        ctx.warn_all(coverage_failures).await;
        let scored = candidates.iter().filter(|c| c.coverage.is_some()).count();
        ctx.progress(
            Stage::Coverage,
            json!({ "scored": scored, "total": candidates.len() }),
        )
        .await;
        ctx.finish(
            Stage::Coverage,
            json!({ "scored": scored, "unscored": candidates.len() - scored }),
        )
        .await;

        // -- embedding -------------------------------------------------------
        ctx.start(Stage::Embedding).await;
        let embedder = self.collaborators.embedder.as_ref();
        let embeddings = ctx
            .guard(
                Stage::Embedding,
                embed_round(embedder, &params.source_text, &anchors, &candidates, sink),
            )
            .await?;
        ctx.warn_all(embeddings.failures.clone()).await;
        let mismatches = apply_similarity(&mut candidates, &anchors, &embeddings);
        ctx.warn_all(mismatches).await;
        let comparable = candidates
            .iter()
            .filter(|c| c.norm_similarity.is_some())
            .count();
        ctx.finish(
            Stage::Embedding,
            json!({
                "source_embedded": embeddings.source.is_some(),
                "anchors_embedded": embeddings.anchors.iter().filter(|a| a.is_some()).count(),
                "candidates_comparable": comparable,
            }),
        )
        .await;

        // -- ranking ---------------------------------------------------------
        ctx.start(Stage::Ranking).await;
        let ranked = rank_candidates(&candidates, &RankOptions::from_params(params));
        let winner_ids: Vec<&str> = ranked.winners.iter().map(|w| w.model_id.as_str()).collect();
        ctx.finish(
            Stage::Ranking,
            json!({
                "mode": params.rank_mode,
                "eligible": ranked.eligible,
                "winners": winner_ids,
            }),
        )
        .await;

        let top_candidates = if params.redact_transport {
            redact_candidates(&ranked.winners)
        } else {
            ranked.winners.clone()
        };

        Ok(RoundArtifacts {
            round_id,
            source_digest: params.source_digest(),
            instruction_set,
            coverage_points,
            anchors,
            candidates: ranked.scored,
            candidates_sorted: ranked.sorted,
            winners: ranked.winners,
            top_candidates,
            warnings: std::mem::take(&mut ctx.warnings),
            params: params.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

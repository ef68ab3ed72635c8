//! Round progress events and the sinks that receive them.
//!
//! Events are passed to a [`RoundEventSink`] one at a time from the task
//! driving the round, so their order always follows stage order even while
//! model calls fan out concurrently.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::Stage;

/// Every event type a round can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEventKind {
    InstructionStarted,
    InstructionFinished,
    AssertionsStarted,
    AssertionsFinished,
    GenerationStarted,
    GenerationProgress,
    GenerationFinished,
    CoverageStarted,
    CoverageProgress,
    CoverageFinished,
    EmbeddingStarted,
    EmbeddingProgress,
    EmbeddingFinished,
    RankingStarted,
    RankingFinished,
    Completed,
    Warning,
    Error,
}

impl RoundEventKind {
    pub fn started(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Instruction => Some(Self::InstructionStarted),
            Stage::Assertions => Some(Self::AssertionsStarted),
            Stage::Generation => Some(Self::GenerationStarted),
            Stage::Coverage => Some(Self::CoverageStarted),
            Stage::Embedding => Some(Self::EmbeddingStarted),
            Stage::Ranking => Some(Self::RankingStarted),
            Stage::Start => None,
        }
    }

    pub fn finished(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Instruction => Some(Self::InstructionFinished),
            Stage::Assertions => Some(Self::AssertionsFinished),
            Stage::Generation => Some(Self::GenerationFinished),
            Stage::Coverage => Some(Self::CoverageFinished),
            Stage::Embedding => Some(Self::EmbeddingFinished),
            Stage::Ranking => Some(Self::RankingFinished),
            Stage::Start => None,
        }
    }

    pub fn progress(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Generation => Some(Self::GenerationProgress),
            Stage::Coverage => Some(Self::CoverageProgress),
            Stage::Embedding => Some(Self::EmbeddingProgress),
            _ => None,
        }
    }

    /// `completed` and `error` end a round; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// A progress event: `{ type, message?, data? }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundEvent {
    #[serde(rename = "type")]
    pub kind: RoundEventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RoundEvent {
    pub fn new(kind: RoundEventKind) -> Self {
        Self {
            kind,
            message: None,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(RoundEventKind::Warning)
            .with_message(message)
            .with_data(serde_json::json!({ "stage": stage }))
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(RoundEventKind::Error)
            .with_message(message)
            .with_data(serde_json::json!({ "stage": stage }))
    }
}

/// Receiver of round progress events.
#[async_trait]
pub trait RoundEventSink: Send + Sync {
    async fn emit(&self, event: RoundEvent);
}

#[async_trait]
impl RoundEventSink for mpsc::UnboundedSender<RoundEvent> {
    async fn emit(&self, event: RoundEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

#[async_trait]
impl RoundEventSink for mpsc::Sender<RoundEvent> {
    async fn emit(&self, event: RoundEvent) {
        let _ = self.send(event).await;
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl RoundEventSink for NullSink {
    async fn emit(&self, _event: RoundEvent) {}
}

/// Adapts a plain callback into a sink.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(RoundEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> RoundEventSink for CallbackSink<F>
where
    F: Fn(RoundEvent) + Send + Sync,
{
    async fn emit(&self, event: RoundEvent) {
        (self.callback)(event);
    }
}

/// Records every event in order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<RoundEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RoundEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<RoundEventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: RoundEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl RoundEventSink for EventRecorder {
    async fn emit(&self, event: RoundEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RoundEvent::new(RoundEventKind::AssertionsFinished)
            .with_data(serde_json::json!({"count": 3}));
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "assertions_finished");
        assert_eq!(json["data"]["count"], 3);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_error_event_carries_stage() {
        let event = RoundEvent::error(Stage::Instruction, "boom");
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["stage"], "instruction");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_stage_kind_mapping() {
        assert_eq!(
            RoundEventKind::started(Stage::Assertions),
            Some(RoundEventKind::AssertionsStarted)
        );
        assert_eq!(
            RoundEventKind::finished(Stage::Ranking),
            Some(RoundEventKind::RankingFinished)
        );
        assert_eq!(RoundEventKind::progress(Stage::Ranking), None);
        assert!(RoundEventKind::Completed.is_terminal());
        assert!(!RoundEventKind::Warning.is_terminal());
    }

    #[tokio::test]
    async fn test_recorder_preserves_order() {
        let recorder = EventRecorder::new();
        recorder.emit(RoundEvent::new(RoundEventKind::InstructionStarted)).await;
        recorder.emit(RoundEvent::new(RoundEventKind::InstructionFinished)).await;
        assert_eq!(
            recorder.kinds(),
            vec![
                RoundEventKind::InstructionStarted,
                RoundEventKind::InstructionFinished
            ]
        );
        assert_eq!(recorder.count(RoundEventKind::InstructionStarted), 1);
    }

    #[tokio::test]
    async fn test_unbounded_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(RoundEvent::new(RoundEventKind::Completed)).await;
        let got = rx.recv().await.expect("event delivered");
        assert_eq!(got.kind, RoundEventKind::Completed);
    }

    #[tokio::test]
    async fn test_callback_sink() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        let sink = CallbackSink::new(move |e: RoundEvent| {
            seen_clone.lock().unwrap().push(e.kind);
        });
        sink.emit(RoundEvent::new(RoundEventKind::Warning)).await;
        assert_eq!(*seen.lock().unwrap(), vec![RoundEventKind::Warning]);
    }
}

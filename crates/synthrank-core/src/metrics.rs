//! Global atomic counters for round observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does so after every round).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    rounds_started: AtomicU64,
    rounds_completed: AtomicU64,
    rounds_failed: AtomicU64,
    soft_failures: AtomicU64,
    candidates_ranked: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            rounds_started: AtomicU64::new(0),
            rounds_completed: AtomicU64::new(0),
            rounds_failed: AtomicU64::new(0),
            soft_failures: AtomicU64::new(0),
            candidates_ranked: AtomicU64::new(0),
        }
    }

    pub fn inc_rounds_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_started", "counter incremented");
    }

    pub fn inc_rounds_completed(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_completed", "counter incremented");
    }

    pub fn inc_rounds_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_failed", "counter incremented");
    }

    pub fn add_soft_failures(&self, n: u64) {
        self.soft_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_candidates_ranked(&self, n: u64) {
        self.candidates_ranked.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            rounds_started = self.rounds_started(),
            rounds_completed = self.rounds_completed(),
            rounds_failed = self.rounds_failed(),
            soft_failures = self.soft_failures(),
            candidates_ranked = self.candidates_ranked(),
        );
    }

    pub fn rounds_started(&self) -> u64 {
        self.rounds_started.load(Ordering::Relaxed)
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    pub fn rounds_failed(&self) -> u64 {
        self.rounds_failed.load(Ordering::Relaxed)
    }

    pub fn soft_failures(&self) -> u64 {
        self.soft_failures.load(Ordering::Relaxed)
    }

    pub fn candidates_ranked(&self) -> u64 {
        self.candidates_ranked.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.rounds_started.store(0, Ordering::Relaxed);
        self.rounds_completed.store(0, Ordering::Relaxed);
        self.rounds_failed.store(0, Ordering::Relaxed);
        self.soft_failures.store(0, Ordering::Relaxed);
        self.candidates_ranked.store(0, Ordering::Relaxed);
    }
}

//! Global atomic counters for comparison outcomes.
//!
//! Counters are bumped silently where the outcome is decided. Call
//! [`Metrics::flush`] to emit the current values as one `tracing::info!`
//! event, e.g. at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    comparisons: AtomicU64,
    vlm_requests: AtomicU64,
    vlm_overrides: AtomicU64,
    vlm_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            comparisons: AtomicU64::new(0),
            vlm_requests: AtomicU64::new(0),
            vlm_overrides: AtomicU64::new(0),
            vlm_failures: AtomicU64::new(0),
        }
    }

    /// A pixel comparison produced a result.
    pub fn inc_comparisons(&self) {
        self.comparisons.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "comparisons", "counter incremented");
    }

    /// A semantic judge was asked for a verdict.
    pub fn inc_vlm_requests(&self) {
        self.vlm_requests.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vlm_requests", "counter incremented");
    }

    /// A judge verdict turned an `unresolved` result into `ok`.
    pub fn inc_vlm_overrides(&self) {
        self.vlm_overrides.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vlm_overrides", "counter incremented");
    }

    /// The semantic stage failed and the pixel result was kept.
    pub fn inc_vlm_failures(&self) {
        self.vlm_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vlm_failures", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            comparisons = self.comparisons(),
            vlm_requests = self.vlm_requests(),
            vlm_overrides = self.vlm_overrides(),
            vlm_failures = self.vlm_failures(),
        );
    }

    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    pub fn vlm_requests(&self) -> u64 {
        self.vlm_requests.load(Ordering::Relaxed)
    }

    pub fn vlm_overrides(&self) -> u64 {
        self.vlm_overrides.load(Ordering::Relaxed)
    }

    pub fn vlm_failures(&self) -> u64 {
        self.vlm_failures.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.comparisons.store(0, Ordering::Relaxed);
        self.vlm_requests.store(0, Ordering::Relaxed);
        self.vlm_overrides.store(0, Ordering::Relaxed);
        self.vlm_failures.store(0, Ordering::Relaxed);
    }
}

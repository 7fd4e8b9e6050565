//! Structured events for the comparison lifecycle.
//!
//! Every comparison run through [`crate::CompareService`] is wrapped in a
//! `vrt.comparison` span carrying a generated `comparison_id`; the emit
//! functions below log the decision points inside it.

use std::fmt::Display;

use tracing::{info, warn, Instrument};
use uuid::Uuid;
use vlm_judge::ProviderKind;

use crate::domain::DiffResult;

/// Span handle for one comparison.
///
/// The span is attached to futures with [`ComparisonSpan::wrap`]
/// rather than entered, so it stays correct across `.await` points and
/// worker threads.
#[derive(Debug, Clone)]
pub struct ComparisonSpan {
    id: String,
    span: tracing::Span,
}

impl ComparisonSpan {
    /// Create a span tagged with a fresh comparison id and the engine name.
    pub fn new(engine: &str) -> Self {
        let id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("vrt.comparison", comparison_id = %id, engine = %engine);
        Self { id, span }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Run `fut` inside this span.
    pub fn wrap<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

/// Emit event: a pixel comparison finished.
pub fn emit_comparison_finished(engine: &str, result: &DiffResult) {
    info!(
        event = "comparison.finished",
        engine = %engine,
        status = %result.status,
        mismatched = result.pixel_mis_match_count,
        diff_percent = result.diff_percent,
        same_dimension = result.is_same_dimension,
        diff_saved = result.diff_name.is_some(),
    );
}

/// Emit event: an unresolved result is being sent to a judge.
pub fn emit_vlm_requested(provider: ProviderKind, model: &str, diff_percent: f64) {
    info!(
        event = "vlm.requested",
        provider = %provider,
        model = %model,
        diff_percent = diff_percent,
    );
}

/// Emit event: the judge answered.
pub fn emit_vlm_verdict(provider: ProviderKind, identical: bool) {
    info!(event = "vlm.verdict", provider = %provider, identical = identical);
}

/// Emit event: the judge could not be used and the pixel result stands (warning level).
pub fn emit_vlm_degraded(provider: ProviderKind, error: &dyn Display) {
    warn!(event = "vlm.degraded", provider = %provider, error = %error);
}

//! Structured observability hooks for the pipeline lifecycle.
//!
//! Every run is instrumented with [`run_span`] so nested events carry the trace id
//! and topic. Emission functions log at `info!`, except collaborator and
//! persistence failures which log at `warn!`.

use tracing::{info, warn};

use crate::domain::{FinalStatus, LevelResult, RepairStatus, Stage, StageStatus};

/// Run-scoped span carrying the trace id and topic.
///
/// Attach it to the run's future so every nested event is tagged:
///
/// ```ignore
/// async { /* stages */ }.instrument(run_span("3f9a1c0b7e21", "Stripe Checkout")).await
/// ```
pub fn run_span(trace_id: &str, topic: &str) -> tracing::Span {
    tracing::info_span!("skillgate.run", trace_id = %trace_id, topic = %topic)
}

pub fn emit_run_started(trace_id: &str, topic: &str, slug: &str) {
    info!(event = "run.started", trace_id = %trace_id, topic = %topic, slug = %slug);
}

pub fn emit_stage_completed(trace_id: &str, stage: Stage, status: StageStatus, duration_ms: u64) {
    info!(
        event = "stage.completed",
        trace_id = %trace_id,
        stage = %stage,
        status = ?status,
        duration_ms = duration_ms,
    );
}

/// Emit event: one ladder level finished.
pub fn emit_level_completed(trace_id: &str, result: &LevelResult) {
    info!(
        event = "level.completed",
        trace_id = %trace_id,
        level = %result.level(),
        status = ?result.status(),
        score = result.score(),
        failures = result.failures().len(),
        duration_ms = result.duration_ms(),
    );
}

pub fn emit_repair_attempted(trace_id: &str, status: RepairStatus, notes_sent: usize) {
    info!(
        event = "repair.attempted",
        trace_id = %trace_id,
        status = ?status,
        notes_sent = notes_sent,
    );
}

/// Emit event: run reached a terminal state.
pub fn emit_run_routed(trace_id: &str, status: FinalStatus, overall_score: f64, hard_failure: bool) {
    info!(
        event = "run.routed",
        trace_id = %trace_id,
        status = %status,
        overall_score = overall_score,
        hard_failure = hard_failure,
    );
}

pub fn emit_collaborator_error(trace_id: &str, stage: Stage, error: &dyn std::fmt::Display) {
    warn!(event = "collaborator.error", trace_id = %trace_id, stage = %stage, error = %error);
}

/// Emit event: publish failed (warning level). The terminal state stands.
pub fn emit_publish_failed(trace_id: &str, slug: &str, error: &dyn std::fmt::Display) {
    warn!(event = "publish.failed", trace_id = %trace_id, slug = %slug, error = %error);
}

pub fn emit_report_persisted(trace_id: &str, path: &std::path::Path) {
    info!(event = "report.persisted", trace_id = %trace_id, path = %path.display());
}

/// Emit event: report could not be written (warning level).
pub fn emit_report_persist_error(trace_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "report.persist_error", trace_id = %trace_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("abc123def456", "Stripe").entered();
        emit_run_started("abc123def456", "Stripe", "stripe");
    }
}

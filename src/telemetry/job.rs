//! Job execution span helpers.
//!
//! Provides span creation and state-transition recording for jobs
//! flowing through the pipeline.

use tracing::Span;

use crate::model::{Job, JobState};

/// Start a span wrapping one delivery of a job.
///
/// The `job.state` field is declared empty and is updated via
/// [`record_state_transition`].
pub fn start_job_span(job: &Job) -> Span {
    tracing::info_span!(
        "job.process",
        "job.id" = %job.id,
        "job.source_key" = %job.source_key,
        "job.receive_count" = job.receive_count,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
///
/// Updates the span's `job.state` field and emits a tracing `info` event
/// scoped to the span.
pub fn record_state_transition(span: &Span, from: JobState, to: JobState) {
    span.record("job.state", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}

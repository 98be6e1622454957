//! Metric instrument factories for scribe-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"scribe-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for scribe-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("scribe-rs")
}

/// Counter: deliveries fully handled.
/// Labels: `result` ("done" | "duplicate" | "failed" | "malformed").
pub fn jobs_processed() -> Counter<u64> {
    meter()
        .u64_counter("scribe.jobs.processed")
        .with_description("Number of job deliveries handled")
        .build()
}

/// Counter: job state transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("scribe.jobs.state_transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Counter: queue-level operations (send, read, delete, set_vt).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("scribe.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: messages moved to the dead-letter queue.
/// Labels: `reason` ("receive_limit" | "malformed").
pub fn dead_letters() -> Counter<u64> {
    meter()
        .u64_counter("scribe.queue.dead_letters")
        .with_description("Messages moved to the dead-letter queue")
        .build()
}

/// Histogram: end-to-end duration of one job delivery in milliseconds.
/// Labels: `result`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("scribe.jobs.duration_ms")
        .with_description("Job delivery duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Histogram: transcription API call duration in milliseconds.
pub fn transcription_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("scribe.stt.duration_ms")
        .with_description("Transcription call duration in milliseconds")
        .with_unit("ms")
        .build()
}

//! Speech-to-text span helpers.
//!
//! Follows the OpenTelemetry GenAI semantic conventions where they fit
//! audio transcription:
//! - `gen_ai.operation.name`
//! - `gen_ai.request.model`

use tracing::Span;

/// Start a span for a transcription call.
///
/// The transcript size field is declared empty and can be filled later
/// via [`record_transcript`].
pub fn start_transcribe_span(model: &str, audio_bytes: usize) -> Span {
    tracing::info_span!(
        "stt.transcribe",
        "gen_ai.operation.name" = "transcription",
        "gen_ai.request.model" = model,
        "stt.audio_bytes" = audio_bytes as u64,
        "stt.transcript_chars" = tracing::field::Empty,
    )
}

/// Record the transcript size on the given span.
///
/// The span must have been created with [`start_transcribe_span`] so the
/// `stt.transcript_chars` field exists.
pub fn record_transcript(span: &Span, chars: u64) {
    span.record("stt.transcript_chars", chars);
}

//! Speech-to-text seam.
//!
//! The pipeline hands audio bytes to a [`TranscriptionEngine`] and gets
//! text back. Production uses the Whisper HTTP API
//! ([`WhisperHttpEngine`]); tests use the canned engines below.

pub mod whisper;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use whisper::WhisperHttpEngine;

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe audio to text. `file_name` carries the container hint
    /// the engine needs to decode the bytes.
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> Result<String>;
}

/// MIME type for an audio file name, by extension.
pub fn audio_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Test engines
// ---------------------------------------------------------------------------

/// Engine that returns a fixed transcript and counts calls.
pub struct StaticEngine {
    transcript: String,
    calls: AtomicUsize,
}

impl StaticEngine {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionEngine for StaticEngine {
    async fn transcribe(&self, _audio: &[u8], _file_name: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcript.clone())
    }
}

/// Engine that always fails with a retryable API error.
pub struct FailingEngine {
    calls: AtomicUsize,
}

impl FailingEngine {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionEngine for FailingEngine {
    async fn transcribe(&self, _audio: &[u8], _file_name: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::TranscriptionApi {
            status: None,
            message: "engine unavailable".into(),
        })
    }
}

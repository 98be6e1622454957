//! Error types for scribe-rs.

use std::time::Duration;

use thiserror::Error;

use crate::model::JobState;

#[derive(Debug, Error)]
pub enum Error {
    /// The event body could not be understood. Never retried.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("source object not found: {bucket}/{key}")]
    SourceNotFound { bucket: String, key: String },

    #[error("source object too large: {key} is {size} bytes (limit {limit})")]
    SourceTooLarge { key: String, size: u64, limit: u64 },

    #[error("transcription request failed: {message}")]
    TranscriptionApi {
        status: Option<u16>,
        message: String,
    },

    #[error("transcription timed out after {0:?}")]
    TranscriptionTimeout(Duration),

    #[error("destination write failed: {0}")]
    DestinationWrite(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// What the queue should do with a delivery whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave the message in place so it redelivers after the visibility
    /// timeout lapses.
    Retry,
    /// Move the message to the dead-letter queue immediately. Retrying
    /// cannot help.
    DeadLetter,
}

impl Error {
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::MalformedEvent(_) => Disposition::DeadLetter,
            _ => Disposition::Retry,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

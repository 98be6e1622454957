//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::event::SuffixFilter;

/// 25 MiB, the upload limit of the transcription API.
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub openai_api_key: SecretString,

    /// Bucket uploads land in. Jobs read their source from here.
    pub source_bucket: String,
    /// Bucket transcripts are written to.
    pub dest_bucket: String,

    pub queue_name: String,
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Deliveries allowed before a message is dead-lettered.
    pub max_receive_count: u32,
    /// Long-poll duration for an empty queue.
    pub receive_wait: Duration,

    pub audio_suffixes: SuffixFilter,
    pub max_source_bytes: u64,

    pub stt_base_url: String,
    pub stt_model: String,
    pub stt_timeout: Duration,

    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            openai_api_key: SecretString::from(required_var("OPENAI_API_KEY")?),
            source_bucket: required_var("SOURCE_BUCKET_NAME")?,
            dest_bucket: required_var("DEST_BUCKET_NAME")?,
            queue_name: var_or("QUEUE_NAME", "transcription_requests"),
            visibility_timeout: Duration::from_secs(parsed_var("VISIBILITY_TIMEOUT_SECS", 300)?),
            max_receive_count: parsed_var("MAX_RECEIVE_COUNT", 3)?,
            receive_wait: Duration::from_secs(parsed_var("RECEIVE_WAIT_SECS", 20)?),
            audio_suffixes: suffixes_var("AUDIO_SUFFIXES")?,
            max_source_bytes: parsed_var("MAX_SOURCE_BYTES", DEFAULT_MAX_SOURCE_BYTES)?,
            stt_base_url: var_or("STT_BASE_URL", "https://api.openai.com/v1"),
            stt_model: var_or("STT_MODEL", "whisper-1"),
            stt_timeout: Duration::from_secs(parsed_var("STT_TIMEOUT_SECS", 120)?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        };
        config.validate()?;
        Ok(config)
    }

    /// The dead-letter queue paired with [`Config::queue_name`].
    pub fn dead_letter_queue_name(&self) -> String {
        format!("{}_dlq", self.queue_name)
    }

    fn validate(&self) -> Result<()> {
        if self.max_receive_count == 0 {
            return Err(Error::Config("MAX_RECEIVE_COUNT must be at least 1".into()));
        }
        // A transcription call that outlives the visibility timeout would
        // let a second worker pick up the same job mid-flight.
        if self.stt_timeout > self.visibility_timeout {
            return Err(Error::Config(format!(
                "STT_TIMEOUT_SECS ({}s) must not exceed VISIBILITY_TIMEOUT_SECS ({}s)",
                self.stt_timeout.as_secs(),
                self.visibility_timeout.as_secs()
            )));
        }
        if self.audio_suffixes.suffixes().is_empty() {
            return Err(Error::Config(
                "AUDIO_SUFFIXES must name at least one suffix".into(),
            ));
        }
        for suffix in self.audio_suffixes.suffixes() {
            if !suffix.starts_with('.') {
                return Err(Error::Config(format!(
                    "audio suffix '{suffix}' must start with '.'"
                )));
            }
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has unparseable value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn suffixes_var(name: &str) -> Result<SuffixFilter> {
    match std::env::var(name) {
        Ok(raw) => {
            let suffixes: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Ok(SuffixFilter::new(suffixes))
        }
        Err(_) => Ok(SuffixFilter::default()),
    }
}

//! # scribe-rs
//!
//! Postgres-backed audio transcription pipeline.
//!
//! Uploads to the source bucket become queue messages; workers pull them
//! with at-least-once delivery, transcribe the audio through a
//! Whisper-compatible API, and write transcripts and a status timeline
//! back to Postgres. Durable queues via pgmq, storage via sqlx, and
//! OpenTelemetry observability throughout.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod status;
pub mod store;
pub mod stt;
pub mod telemetry;

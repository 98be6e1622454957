//! The transcription pipeline.
//!
//! Intake turns uploads into queue messages; workers turn queue messages
//! into transcripts and status rows.

pub mod intake;
pub mod worker;

pub use intake::{Intake, Submitted};
pub use worker::{Worker, WorkerConfig};

//! Core data model.
//!
//! A job is one transcription request: a source object that needs turning
//! into a transcript. It has identity (the job id derived from the object
//! key), provenance (bucket + key), and lifecycle state.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job Id
// ---------------------------------------------------------------------------

/// Newtype for job IDs.
///
/// The id is the file stem of the source object key: the final path segment
/// with its extension removed. `jobs/42.wav` and `jobs/42.mp3` share the id
/// `42`, so re-uploads of the same recording in a different container
/// converge on one transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the job id from a decoded object key.
    ///
    /// Keys whose file stem is empty (`.wav`) or still contains a dot
    /// (`take.2.wav`) have no unambiguous id and are rejected as malformed.
    pub fn derive(key: &str) -> Result<Self> {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => file_name,
        };
        if stem.is_empty() {
            return Err(Error::MalformedEvent(format!(
                "cannot derive job id from key '{key}'"
            )));
        }
        if stem.contains('.') {
            return Err(Error::MalformedEvent(format!(
                "ambiguous job id in key '{key}': stem '{stem}' contains a dot"
            )));
        }
        Ok(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Destination key for this job's transcript.
    pub fn dest_key(&self) -> String {
        format!("transcriptions/{}.txt", self.0)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// States form a straight line from `Received` to `Done`; any non-terminal
/// state may drop to `Failed` instead. A later redelivery of the same job
/// starts the line over from `Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Delivery picked up, source not yet fetched.
    Received,
    /// Fetching the source object.
    Downloading,
    /// Source bytes handed to the transcription engine.
    Transcribing,
    /// Transcript produced, writing it to the destination.
    Writing,
    /// Transcript written. Terminal.
    Done,
    /// An attempt failed. Terminal for this attempt; a redelivery may
    /// still succeed later.
    Failed,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Received, Downloading)
                | (Downloading, Transcribing)
                | (Transcribing, Writing)
                | (Writing, Done)
                | (Received, Failed)
                | (Downloading, Failed)
                | (Transcribing, Failed)
                | (Writing, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Downloading => "downloading",
            JobState::Transcribing => "transcribing",
            JobState::Writing => "writing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(JobState::Received),
            "downloading" => Ok(JobState::Downloading),
            "transcribing" => Ok(JobState::Transcribing),
            "writing" => Ok(JobState::Writing),
            "done" => Ok(JobState::Done),
            "failed" => Ok(JobState::Failed),
            _ => Err(Error::Other(format!("unknown job state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One attempt at transcribing a source object, tracked through its states.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source_bucket: String,
    pub source_key: String,
    /// How many times the queue has handed this message out, this
    /// delivery included.
    pub receive_count: u32,
    pub state: JobState,
    /// Millisecond timestamp of the last status row written for this
    /// attempt. Status rows are keyed (job_id, ts), so timestamps must
    /// strictly increase even when two phases finish in the same
    /// millisecond.
    last_status_ts: i64,
}

impl Job {
    pub fn new(
        id: JobId,
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        receive_count: u32,
    ) -> Self {
        Self {
            id,
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            receive_count,
            state: JobState::Received,
            last_status_ts: 0,
        }
    }

    /// Move to `to`, enforcing the transition table.
    pub fn advance(&mut self, to: JobState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Timestamp for the next status row: wall-clock now, bumped forward
    /// if now would collide with or precede the previous row.
    pub fn next_status_ts(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let ts = now.max(self.last_status_ts + 1);
        self.last_status_ts = ts;
        ts
    }

    /// Final path segment of the source key.
    pub fn file_name(&self) -> &str {
        self.source_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.source_key)
    }
}

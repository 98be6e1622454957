//! Job status timeline seam.
//!
//! Every state a job passes through is appended as a row keyed
//! (job_id, timestamp). The timeline is the system of record an operator
//! queries to answer "what happened to job 42".

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{JobId, JobState};

pub use memory::MemoryStatusStore;

/// One row of a job's status timeline.
#[derive(Debug, Clone)]
pub struct StatusRecord {
    pub job_id: JobId,
    pub timestamp_ms: i64,
    pub state: JobState,
    pub detail: String,
}

/// Append-mostly status timeline.
///
/// Writes honor a no-regress guard: once a job has a `done` row, further
/// non-`done` writes are silently dropped, so a redundant redelivery that
/// fails can never make a finished job look unfinished. A second `done`
/// write is allowed; it records the duplicate completing.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Record a state. Same (job_id, timestamp) overwrites the row.
    async fn put_status(
        &self,
        job_id: &JobId,
        timestamp_ms: i64,
        state: JobState,
        detail: &str,
    ) -> Result<()>;

    /// Most recent status row for a job, by timestamp. `None` if the job
    /// has never been seen.
    async fn latest_status(&self, job_id: &JobId) -> Result<Option<StatusRecord>>;

    /// Full timeline for a job, oldest first.
    async fn history(&self, job_id: &JobId) -> Result<Vec<StatusRecord>>;
}

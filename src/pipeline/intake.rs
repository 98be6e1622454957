//! Upload intake: stores the object, then enqueues the event the object
//! store would have emitted.
//!
//! Every upload is stored; only keys passing the audio suffix filter
//! become queue messages.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::event::{StoreEvent, SuffixFilter};
use crate::model::JobId;
use crate::queue::{MessageId, WorkQueue};
use crate::store::ObjectStore;

/// Front door of the pipeline.
pub struct Intake {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    filter: SuffixFilter,
    bucket: String,
}

/// What became of an upload.
#[derive(Debug)]
pub enum Submitted {
    /// Stored and enqueued for transcription.
    Queued {
        message_id: MessageId,
        /// `None` when no job id can be derived from the key; the worker
        /// will dead-letter the event.
        job_id: Option<JobId>,
    },
    /// Stored, but the key is not an audio file the pipeline transcribes.
    Filtered,
}

impl Intake {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        filter: SuffixFilter,
        bucket: &str,
    ) -> Self {
        Self {
            store,
            queue,
            filter,
            bucket: bucket.to_string(),
        }
    }

    /// Store an upload and, if it looks like audio, enqueue its event.
    pub async fn submit(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Submitted> {
        let size = bytes.len() as u64;
        self.store.put(&self.bucket, key, bytes, content_type).await?;

        if !self.filter.matches(key) {
            info!(key, "upload stored, suffix not transcribable");
            return Ok(Submitted::Filtered);
        }

        let event = StoreEvent::object_created(&self.bucket, key, size);
        let message_id = self.queue.enqueue(&event.to_body()?).await?;
        let job_id = JobId::derive(key).ok();
        info!(key, msg_id = %message_id, "upload enqueued for transcription");
        Ok(Submitted::Queued { message_id, job_id })
    }
}

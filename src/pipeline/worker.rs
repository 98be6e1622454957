//! Worker loop: receives deliveries, drives each job through its states.
//!
//! One delivery is one attempt. Success acknowledges the message; a
//! retryable failure leaves it for the visibility timeout to redeliver;
//! an unreadable message goes straight to the dead-letter queue. Crashing
//! mid-job loses nothing because the message is only hidden, not deleted.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, Span, error, info, warn};

use crate::config::Config;
use crate::error::{Disposition, Error, Result};
use crate::event::{self, StoreEvent};
use crate::model::{Job, JobId, JobState};
use crate::queue::{Delivery, WorkQueue};
use crate::status::StatusStore;
use crate::store::ObjectStore;
use crate::stt::TranscriptionEngine;
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

/// Pause after a failed receive before asking the queue again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bucket jobs read their source audio from.
    pub source_bucket: String,
    /// Bucket transcripts are written to.
    pub dest_bucket: String,
    /// Largest source object the worker will download.
    pub max_source_bytes: u64,
    /// Long-poll duration per receive call.
    pub receive_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            source_bucket: "uploads".into(),
            dest_bucket: "transcripts".into(),
            max_source_bytes: crate::config::DEFAULT_MAX_SOURCE_BYTES,
            receive_wait: Duration::from_secs(20),
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_bucket: config.source_bucket.clone(),
            dest_bucket: config.dest_bucket.clone(),
            max_source_bytes: config.max_source_bytes,
            receive_wait: config.receive_wait,
        }
    }
}

/// How a delivery was resolved when processing succeeded.
enum Processed {
    Done { job_id: JobId },
    Duplicate { job_id: JobId },
}

/// The worker loop: receive deliveries, process jobs, settle messages.
pub struct Worker {
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    engine: Arc<dyn TranscriptionEngine>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
}

impl Clone for Worker {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            status: Arc::clone(&self.status),
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Worker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
        engine: Arc<dyn TranscriptionEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            status,
            engine,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the worker to shut down after the current delivery.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the worker loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!("worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("worker shutting down");
                    return Ok(());
                }
                received = self.queue.receive(1, self.config.receive_wait) => {
                    match received {
                        Ok(batch) => {
                            for delivery in batch {
                                self.handle(delivery).await;
                            }
                        }
                        Err(e) => {
                            error!("receive error: {e}");
                            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    /// Handle one delivery end to end, including its queue disposition.
    pub async fn handle(&self, delivery: Delivery) {
        let delivery_id = delivery.id;
        let started = std::time::Instant::now();
        match self.process(&delivery).await {
            Ok(Processed::Done { job_id }) => {
                info!(job_id = %job_id, msg_id = %delivery_id, "job done");
                metrics::jobs_processed().add(1, &[KeyValue::new("result", "done")]);
                metrics::job_duration_ms().record(
                    started.elapsed().as_millis() as f64,
                    &[KeyValue::new("result", "done")],
                );
                if let Err(e) = self.queue.acknowledge(delivery_id).await {
                    error!(msg_id = %delivery_id, "acknowledge failed: {e}");
                }
            }
            Ok(Processed::Duplicate { job_id }) => {
                info!(job_id = %job_id, msg_id = %delivery_id, "job already done, dropping delivery");
                metrics::jobs_processed().add(1, &[KeyValue::new("result", "duplicate")]);
                if let Err(e) = self.queue.acknowledge(delivery_id).await {
                    error!(msg_id = %delivery_id, "acknowledge failed: {e}");
                }
            }
            Err(e) => match e.disposition() {
                Disposition::DeadLetter => {
                    warn!(msg_id = %delivery_id, "dropping undecodable delivery: {e}");
                    metrics::jobs_processed().add(1, &[KeyValue::new("result", "malformed")]);
                    metrics::dead_letters().add(1, &[KeyValue::new("reason", "malformed")]);
                    let reason = e.to_string();
                    if let Err(e) = self.queue.dead_letter(delivery_id, &reason).await {
                        error!(msg_id = %delivery_id, "dead-letter failed: {e}");
                    }
                }
                Disposition::Retry => {
                    // Leave the message in place; the visibility timeout
                    // will make it reappear for another attempt.
                    error!(
                        msg_id = %delivery_id,
                        receive_count = delivery.receive_count,
                        "job attempt failed: {e}"
                    );
                    metrics::jobs_processed().add(1, &[KeyValue::new("result", "failed")]);
                    metrics::job_duration_ms().record(
                        started.elapsed().as_millis() as f64,
                        &[KeyValue::new("result", "failed")],
                    );
                }
            },
        }
    }

    /// Decode the event and drive the job. Errors carry their queue
    /// disposition; malformed events fail here before any status row is
    /// written.
    async fn process(&self, delivery: &Delivery) -> Result<Processed> {
        let event = StoreEvent::parse(&delivery.body)?;
        let record = event.first_record()?;
        let key = event::decode_object_key(&record.s3.object.key)?;
        let job_id = JobId::derive(&key)?;

        // The configured source bucket is authoritative; a mismatched
        // event bucket is worth a warning but not a failure.
        if record.s3.bucket.name != self.config.source_bucket {
            warn!(
                event_bucket = %record.s3.bucket.name,
                source_bucket = %self.config.source_bucket,
                "event bucket differs from configured source bucket"
            );
        }

        let mut job = Job::new(
            job_id,
            self.config.source_bucket.clone(),
            key,
            delivery.receive_count,
        );

        let span = start_job_span(&job);
        async {
            // Redundant redelivery of a finished job: drop it without
            // re-running the pipeline.
            if let Some(latest) = self.status.latest_status(&job.id).await? {
                if latest.state == JobState::Done {
                    return Ok(Processed::Duplicate {
                        job_id: job.id.clone(),
                    });
                }
            }

            let detail = format!("receive #{} of {}", job.receive_count, job.source_key);
            let ts = job.next_status_ts();
            self.status
                .put_status(&job.id, ts, JobState::Received, &detail)
                .await?;

            match self.execute(&mut job).await {
                Ok(chars) => {
                    self.advance(&mut job, JobState::Done, &format!("{chars} chars"))
                        .await?;
                    Ok(Processed::Done {
                        job_id: job.id.clone(),
                    })
                }
                Err(e) => {
                    // Record the failure; if even that fails, the original
                    // error still wins.
                    if let Err(status_err) =
                        self.advance(&mut job, JobState::Failed, &e.to_string()).await
                    {
                        warn!(job_id = %job.id, "failed to record failure: {status_err}");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// One attempt: download, transcribe, write. Returns transcript size
    /// in characters.
    async fn execute(&self, job: &mut Job) -> Result<usize> {
        self.advance(job, JobState::Downloading, "").await?;
        let size = self
            .store
            .head(&job.source_bucket, &job.source_key)
            .await?
            .ok_or_else(|| Error::SourceNotFound {
                bucket: job.source_bucket.clone(),
                key: job.source_key.clone(),
            })?;
        if size > self.config.max_source_bytes {
            return Err(Error::SourceTooLarge {
                key: job.source_key.clone(),
                size,
                limit: self.config.max_source_bytes,
            });
        }
        let object = self
            .store
            .get(&job.source_bucket, &job.source_key)
            .await?
            .ok_or_else(|| Error::SourceNotFound {
                bucket: job.source_bucket.clone(),
                key: job.source_key.clone(),
            })?;

        self.advance(
            job,
            JobState::Transcribing,
            &format!("{} bytes", object.bytes.len()),
        )
        .await?;
        let transcript = self.engine.transcribe(&object.bytes, job.file_name()).await?;

        let dest_key = job.id.dest_key();
        self.advance(job, JobState::Writing, &dest_key).await?;
        let chars = transcript.chars().count();
        self.store
            .put(
                &self.config.dest_bucket,
                &dest_key,
                transcript.into_bytes(),
                "text/plain",
            )
            .await
            .map_err(|e| Error::DestinationWrite(e.to_string()))?;
        Ok(chars)
    }

    /// Validate-and-record one state transition.
    async fn advance(&self, job: &mut Job, to: JobState, detail: &str) -> Result<()> {
        let from = job.state;
        job.advance(to)?;
        record_state_transition(&Span::current(), from, to);
        metrics::job_state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
        let ts = job.next_status_ts();
        self.status.put_status(&job.id, ts, to, detail).await
    }
}

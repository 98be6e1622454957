//! End-to-end pipeline tests over the in-memory backends.
//!
//! Each test wires a worker to its own queue, object store, and status
//! store, then drives deliveries by hand (or via `run` for the loop test).

use std::sync::Arc;
use std::time::Duration;

use scribe_rs::event::{StoreEvent, SuffixFilter};
use scribe_rs::model::{JobId, JobState};
use scribe_rs::pipeline::{Intake, Submitted, Worker, WorkerConfig};
use scribe_rs::queue::{MemoryQueue, WorkQueue};
use scribe_rs::status::{MemoryStatusStore, StatusStore};
use scribe_rs::store::{MemoryObjectStore, ObjectStore};
use scribe_rs::stt::{FailingEngine, StaticEngine, TranscriptionEngine};

const VISIBILITY: Duration = Duration::from_secs(300);
const NO_WAIT: Duration = Duration::ZERO;

struct Harness {
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryObjectStore>,
    status: Arc<MemoryStatusStore>,
    worker: Worker,
}

fn harness(engine: Arc<dyn TranscriptionEngine>) -> Harness {
    harness_with(engine, WorkerConfig {
        receive_wait: NO_WAIT,
        ..WorkerConfig::default()
    })
}

fn harness_with(engine: Arc<dyn TranscriptionEngine>, config: WorkerConfig) -> Harness {
    let queue = Arc::new(MemoryQueue::new(VISIBILITY, 3));
    let store = Arc::new(MemoryObjectStore::new());
    let status = Arc::new(MemoryStatusStore::new());
    let worker = Worker::new(
        Arc::clone(&queue) as Arc<dyn WorkQueue>,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&status) as Arc<dyn StatusStore>,
        engine,
        config,
    );
    Harness { queue, store, status, worker }
}

impl Harness {
    fn intake(&self) -> Intake {
        Intake::new(
            Arc::clone(&self.store) as Arc<dyn ObjectStore>,
            Arc::clone(&self.queue) as Arc<dyn WorkQueue>,
            SuffixFilter::default(),
            "uploads",
        )
    }

    /// Pull one delivery and run it through the worker.
    async fn work_one(&self) {
        let batch = self.queue.receive(1, NO_WAIT).await.unwrap();
        assert_eq!(batch.len(), 1, "expected a delivery");
        for delivery in batch {
            self.worker.handle(delivery).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Happy path: upload → event → transcript
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_to_transcript_end_to_end() {
    let engine = Arc::new(StaticEngine::new("hello from the recording"));
    let h = harness(engine.clone());

    let submitted = h
        .intake()
        .submit("jobs/42.wav", b"RIFFdata".to_vec(), "audio/wav")
        .await
        .unwrap();
    assert!(matches!(submitted, Submitted::Queued { .. }));

    h.work_one().await;

    let transcript = h
        .store
        .get("transcripts", "transcriptions/42.txt")
        .await
        .unwrap()
        .expect("transcript written");
    assert_eq!(transcript.bytes, b"hello from the recording");
    assert_eq!(transcript.content_type, "text/plain");

    let latest = h.status.latest_status(&JobId::from("42")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Done);

    // Message settled, nothing left to deliver.
    assert!(h.queue.receive(1, NO_WAIT).await.unwrap().is_empty());
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn status_timeline_records_every_phase() {
    let h = harness(Arc::new(StaticEngine::new("text")));
    h.intake().submit("jobs/42.wav", vec![1, 2, 3], "audio/wav").await.unwrap();
    h.work_one().await;

    let history = h.status.history(&JobId::from("42")).await.unwrap();
    let states: Vec<_> = history.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![
            JobState::Received,
            JobState::Downloading,
            JobState::Transcribing,
            JobState::Writing,
            JobState::Done,
        ]
    );
    // Timestamps strictly increase even when phases finish within the
    // same millisecond.
    for window in history.windows(2) {
        assert!(window[1].timestamp_ms > window[0].timestamp_ms);
    }
}

#[tokio::test]
async fn keys_with_spaces_round_trip_through_the_event() {
    let h = harness(Arc::new(StaticEngine::new("minutes")));
    h.intake()
        .submit("meetings/q3 planning.wav", vec![1], "audio/wav")
        .await
        .unwrap();
    h.work_one().await;

    let latest = h
        .status
        .latest_status(&JobId::from("q3 planning"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.state, JobState::Done);
    assert!(
        h.store
            .get("transcripts", "transcriptions/q3 planning.txt")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn non_audio_upload_is_stored_but_not_queued() {
    let h = harness(Arc::new(StaticEngine::new("unused")));
    let submitted = h
        .intake()
        .submit("notes/readme.txt", b"hello".to_vec(), "text/plain")
        .await
        .unwrap();
    assert!(matches!(submitted, Submitted::Filtered));
    assert!(h.store.get("uploads", "notes/readme.txt").await.unwrap().is_some());
    assert!(h.queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Duplicates and redeliveries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_delivery_converges_without_a_second_transcription() {
    let engine = Arc::new(StaticEngine::new("text"));
    let h = harness(engine.clone());
    h.intake().submit("jobs/42.wav", vec![1], "audio/wav").await.unwrap();

    // The store emits the same event twice (at-least-once ingest).
    let event = StoreEvent::object_created("uploads", "jobs/42.wav", 1);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    h.work_one().await;
    h.work_one().await;

    assert_eq!(engine.calls(), 1, "duplicate must not re-transcribe");
    let latest = h.status.latest_status(&JobId::from("42")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Done);
    assert!(h.queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

#[tokio::test]
async fn event_bucket_mismatch_still_reads_the_configured_bucket() {
    let h = harness(Arc::new(StaticEngine::new("text")));
    // The object lives in the configured source bucket, but the event
    // claims another one.
    h.store.put("uploads", "jobs/42.wav", vec![1], "audio/wav").await.unwrap();
    let event = StoreEvent::object_created("somewhere-else", "jobs/42.wav", 1);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    h.work_one().await;

    let latest = h.status.latest_status(&JobId::from("42")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Done);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_event_goes_straight_to_dead_letters() {
    let engine = Arc::new(StaticEngine::new("unused"));
    let h = harness(engine.clone());
    h.queue.enqueue(r#"{"Records": "definitely not a list"}"#).await.unwrap();

    h.work_one().await;

    assert_eq!(h.queue.dead_letters().await.unwrap().len(), 1);
    assert_eq!(engine.calls(), 0);
    assert!(h.queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

#[tokio::test]
async fn ambiguous_job_id_dead_letters_without_a_status_row() {
    let h = harness(Arc::new(StaticEngine::new("unused")));
    let event = StoreEvent::object_created("uploads", "jobs/take.2.wav", 9);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    h.work_one().await;

    assert_eq!(h.queue.dead_letters().await.unwrap().len(), 1);
    assert!(
        h.status
            .latest_status(&JobId::from("take.2"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(start_paused = true)]
async fn missing_source_fails_the_attempt_and_leaves_the_message() {
    let engine = Arc::new(StaticEngine::new("unused"));
    let h = harness(engine.clone());

    // Event for an object nobody uploaded.
    let event = StoreEvent::object_created("uploads", "jobs/ghost.wav", 10);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    h.work_one().await;

    let latest = h.status.latest_status(&JobId::from("ghost")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Failed);
    assert_eq!(engine.calls(), 0);

    // Not acknowledged: it comes back once the visibility lapses.
    tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;
    let batch = h.queue.receive(1, NO_WAIT).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].receive_count, 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_exhausts_retries_into_dead_letters() {
    let engine = Arc::new(FailingEngine::new());
    let h = harness(engine.clone());
    h.intake().submit("jobs/42.wav", vec![0u8; 16], "audio/wav").await.unwrap();

    // Three failing attempts, each redelivered after a visibility lapse.
    for attempt in 1..=3usize {
        h.work_one().await;
        assert_eq!(engine.calls(), attempt);
        let latest = h.status.latest_status(&JobId::from("42")).await.unwrap().unwrap();
        assert_eq!(latest.state, JobState::Failed, "attempt {attempt}");
        tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;
    }

    // The fourth receive retires the message instead of delivering it.
    assert!(h.queue.receive(1, NO_WAIT).await.unwrap().is_empty());
    assert_eq!(h.queue.dead_letters().await.unwrap().len(), 1);
    assert_eq!(engine.calls(), 3);
}

#[tokio::test]
async fn oversized_source_fails_without_transcribing() {
    let engine = Arc::new(StaticEngine::new("unused"));
    let h = harness_with(
        engine.clone(),
        WorkerConfig {
            max_source_bytes: 8,
            receive_wait: NO_WAIT,
            ..WorkerConfig::default()
        },
    );

    h.store.put("uploads", "jobs/big.wav", vec![0u8; 16], "audio/wav").await.unwrap();
    let event = StoreEvent::object_created("uploads", "jobs/big.wav", 16);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    h.work_one().await;

    assert_eq!(engine.calls(), 0);
    let latest = h.status.latest_status(&JobId::from("big")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Failed);
    assert!(latest.detail.contains("too large"), "detail: {}", latest.detail);
}

// ---------------------------------------------------------------------------
// The run loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_loop_processes_and_shuts_down() {
    let engine = Arc::new(StaticEngine::new("loop"));
    let h = harness_with(
        engine.clone(),
        WorkerConfig {
            receive_wait: Duration::from_millis(50),
            ..WorkerConfig::default()
        },
    );

    h.store.put("uploads", "jobs/42.wav", vec![1], "audio/wav").await.unwrap();
    let event = StoreEvent::object_created("uploads", "jobs/42.wav", 1);
    h.queue.enqueue(&event.to_body().unwrap()).await.unwrap();

    let handle = h.worker.clone();
    let join = tokio::spawn(async move { handle.run().await });

    // Wait for the transcript to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if h.store
            .get("transcripts", "transcriptions/42.txt")
            .await
            .unwrap()
            .is_some()
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker never produced the transcript"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.worker.shutdown();
    join.await.unwrap().unwrap();
}

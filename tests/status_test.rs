//! Tests for the status timeline store.

use scribe_rs::model::{JobId, JobState};
use scribe_rs::status::{MemoryStatusStore, StatusStore};

fn id(s: &str) -> JobId {
    JobId::from(s)
}

#[tokio::test]
async fn latest_reflects_the_highest_timestamp() {
    let store = MemoryStatusStore::new();
    let job = id("42");

    store.put_status(&job, 1_000, JobState::Received, "").await.unwrap();
    store.put_status(&job, 2_000, JobState::Downloading, "").await.unwrap();
    store.put_status(&job, 1_500, JobState::Transcribing, "").await.unwrap();

    let latest = store.latest_status(&job).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Downloading);
    assert_eq!(latest.timestamp_ms, 2_000);
}

#[tokio::test]
async fn history_is_ordered_oldest_first() {
    let store = MemoryStatusStore::new();
    let job = id("42");

    store.put_status(&job, 3, JobState::Transcribing, "").await.unwrap();
    store.put_status(&job, 1, JobState::Received, "").await.unwrap();
    store.put_status(&job, 2, JobState::Downloading, "").await.unwrap();

    let history = store.history(&job).await.unwrap();
    let states: Vec<_> = history.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![JobState::Received, JobState::Downloading, JobState::Transcribing]
    );
}

#[tokio::test]
async fn same_timestamp_overwrites() {
    let store = MemoryStatusStore::new();
    let job = id("42");

    store.put_status(&job, 1_000, JobState::Received, "first").await.unwrap();
    store.put_status(&job, 1_000, JobState::Downloading, "second").await.unwrap();

    let history = store.history(&job).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, JobState::Downloading);
    assert_eq!(history[0].detail, "second");
}

#[tokio::test]
async fn done_job_ignores_later_non_done_writes() {
    let store = MemoryStatusStore::new();
    let job = id("42");

    store.put_status(&job, 1, JobState::Received, "").await.unwrap();
    store.put_status(&job, 2, JobState::Done, "42 chars").await.unwrap();

    // A late redelivery trying to restart the job changes nothing.
    store.put_status(&job, 3, JobState::Received, "receive #2").await.unwrap();
    store.put_status(&job, 4, JobState::Failed, "boom").await.unwrap();

    let latest = store.latest_status(&job).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Done);
    assert_eq!(store.history(&job).await.unwrap().len(), 2);
}

#[tokio::test]
async fn second_done_write_is_recorded() {
    let store = MemoryStatusStore::new();
    let job = id("42");

    store.put_status(&job, 1, JobState::Done, "").await.unwrap();
    store.put_status(&job, 2, JobState::Done, "again").await.unwrap();

    assert_eq!(store.history(&job).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_job_has_no_status() {
    let store = MemoryStatusStore::new();
    assert!(store.latest_status(&id("nope")).await.unwrap().is_none());
    assert!(store.history(&id("nope")).await.unwrap().is_empty());
}

#[tokio::test]
async fn jobs_do_not_share_timelines() {
    let store = MemoryStatusStore::new();
    store.put_status(&id("a"), 1, JobState::Received, "").await.unwrap();
    store.put_status(&id("b"), 1, JobState::Done, "").await.unwrap();

    let latest = store.latest_status(&id("a")).await.unwrap().unwrap();
    assert_eq!(latest.state, JobState::Received);
}

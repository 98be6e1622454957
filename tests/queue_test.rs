//! Tests for the in-memory queue's delivery semantics.
//!
//! Paused tokio time drives the visibility deadlines deterministically.

use std::sync::Arc;
use std::time::Duration;

use scribe_rs::queue::{MemoryQueue, WorkQueue};

const VISIBILITY: Duration = Duration::from_secs(300);
const NO_WAIT: Duration = Duration::ZERO;

fn test_queue() -> MemoryQueue {
    MemoryQueue::new(VISIBILITY, 3)
}

// ---------------------------------------------------------------------------
// Basic lifecycle: enqueue → receive → acknowledge
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn received_message_is_invisible_until_the_timeout_lapses() {
    let queue = test_queue();
    queue.enqueue(r#"{"n":1}"#).await.unwrap();

    let first = queue.receive(1, NO_WAIT).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].receive_count, 1);

    // Still hidden.
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());

    // Visible again once the timeout lapses, with a bumped count.
    tokio::time::advance(VISIBILITY + Duration::from_millis(1)).await;
    let second = queue.receive(1, NO_WAIT).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
    assert_eq!(second[0].receive_count, 2);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_message_never_redelivers() {
    let queue = test_queue();
    queue.enqueue(r#"{"n":1}"#).await.unwrap();

    let batch = queue.receive(1, NO_WAIT).await.unwrap();
    queue.acknowledge(batch[0].id).await.unwrap();

    tokio::time::advance(VISIBILITY * 2).await;
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_and_double_acknowledges_are_quiet() {
    let queue = test_queue();
    queue.enqueue(r#"{"n":1}"#).await.unwrap();
    let first = queue.receive(1, NO_WAIT).await.unwrap();

    tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;
    let second = queue.receive(1, NO_WAIT).await.unwrap();
    assert_eq!(second.len(), 1);

    // The late original consumer and the current one settle the same
    // message; the second acknowledge finds nothing and stays quiet.
    queue.acknowledge(first[0].id).await.unwrap();
    queue.acknowledge(second[0].id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn receive_honors_the_batch_size() {
    let queue = test_queue();
    for n in 0..3 {
        queue.enqueue(&format!(r#"{{"n":{n}}}"#)).await.unwrap();
    }
    assert_eq!(queue.receive(2, NO_WAIT).await.unwrap().len(), 2);
    assert_eq!(queue.receive(2, NO_WAIT).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Dead-letter behavior
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn receive_limit_retires_the_message() {
    let queue = test_queue(); // max_receive_count = 3
    queue.enqueue(r#"{"n":1}"#).await.unwrap();

    for attempt in 1..=3u32 {
        let batch = queue.receive(1, NO_WAIT).await.unwrap();
        assert_eq!(batch.len(), 1, "delivery {attempt}");
        assert_eq!(batch[0].receive_count, attempt);
        tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;
    }

    // Limit reached: the fourth attempt retires the message instead of
    // handing it out.
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());
    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, r#"{"n":1}"#);

    // And it stays retired.
    tokio::time::advance(VISIBILITY * 2).await;
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_dead_letter_moves_the_message_immediately() {
    let queue = test_queue();
    queue.enqueue(r#"{"bad":true}"#).await.unwrap();
    let batch = queue.receive(1, NO_WAIT).await.unwrap();

    queue.dead_letter(batch[0].id, "undecodable").await.unwrap();

    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, r#"{"bad":true}"#);

    tokio::time::advance(VISIBILITY * 2).await;
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Visibility control
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn extend_visibility_delays_redelivery() {
    let queue = test_queue();
    queue.enqueue(r#"{"n":1}"#).await.unwrap();
    let batch = queue.receive(1, NO_WAIT).await.unwrap();

    // Half the window gone, then push the deadline out again.
    tokio::time::advance(VISIBILITY / 2).await;
    queue
        .extend_visibility(batch[0].id, VISIBILITY)
        .await
        .unwrap();

    // The original deadline passes without a redelivery.
    tokio::time::advance(VISIBILITY / 2 + Duration::from_secs(1)).await;
    assert!(queue.receive(1, NO_WAIT).await.unwrap().is_empty());

    // The extended one lapses as usual.
    tokio::time::advance(VISIBILITY).await;
    assert_eq!(queue.receive(1, NO_WAIT).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Long polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn long_poll_wakes_when_a_message_arrives() {
    let queue = Arc::new(test_queue());

    let receiver = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.receive(1, Duration::from_secs(20)).await })
    };

    // Let the receiver reach its wait before enqueueing.
    tokio::task::yield_now().await;
    queue.enqueue(r#"{"n":1}"#).await.unwrap();

    let batch = receiver.await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_receive_returns_after_the_wait() {
    let queue = test_queue();
    let batch = queue.receive(1, Duration::from_secs(5)).await.unwrap();
    assert!(batch.is_empty());
}

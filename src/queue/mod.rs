//! Durable work queue seam.
//!
//! At-least-once delivery with a visibility timeout. A received message
//! is hidden, not removed; only an explicit [`WorkQueue::acknowledge`]
//! deletes it. If the consumer crashes or lets the visibility timeout
//! lapse, the message redelivers with a higher receive count. A message
//! that has been handed out `max_receive_count` times is retired to the
//! dead-letter queue instead of being delivered again.
//!
//! Backends: pgmq-backed Postgres ([`crate::db::PgmqQueue`]) or in-memory
//! for tests.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use memory::MemoryQueue;

/// Newtype for queue message IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One handed-out message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: MessageId,
    pub body: String,
    /// Deliveries so far, this one included. Starts at 1.
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a message.
    async fn enqueue(&self, body: &str) -> Result<MessageId>;

    /// Receive up to `max` messages, long-polling for up to `wait` when
    /// the queue is empty. Received messages stay invisible for the
    /// backend's visibility timeout. Messages over the receive limit are
    /// moved to the dead-letter queue rather than delivered.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>>;

    /// Delete a message for good. Acknowledging a message that is already
    /// gone is a quiet no-op; after a visibility lapse another consumer
    /// may have finished it first.
    async fn acknowledge(&self, id: MessageId) -> Result<()>;

    /// Reset a message's invisibility to `duration` from now.
    async fn extend_visibility(&self, id: MessageId, duration: Duration) -> Result<()>;

    /// Move a message to the dead-letter queue immediately, keeping its
    /// body. `reason` is for the logs, not the stored message.
    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<()>;

    /// Inspect the dead-letter queue without consuming it.
    async fn dead_letters(&self) -> Result<Vec<Delivery>>;
}

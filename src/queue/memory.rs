//! In-memory queue with real visibility-timeout semantics.
//!
//! Uses `tokio::time` for visibility deadlines so tests can drive
//! redelivery deterministically with paused time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{Delivery, MessageId, WorkQueue};
use crate::error::Result;

pub struct MemoryQueue {
    visibility_timeout: Duration,
    max_receive_count: u32,
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    messages: Vec<Message>,
    dead: Vec<Message>,
}

struct Message {
    id: i64,
    body: String,
    receive_count: u32,
    enqueued_at: DateTime<Utc>,
    invisible_until: Option<Instant>,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            visibility_timeout,
            max_receive_count,
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            }),
            notify: Notify::new(),
        }
    }

    /// One sweep over the queue: retire over-limit messages, hand out
    /// visible ones. Returns the batch and the earliest instant an
    /// invisible message becomes visible again.
    fn take_visible(&self, inner: &mut Inner, max: usize) -> (Vec<Delivery>, Option<Instant>) {
        let now = Instant::now();
        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;
        let mut i = 0;
        while i < inner.messages.len() {
            if batch.len() >= max {
                break;
            }
            if let Some(until) = inner.messages[i].invisible_until {
                if until > now {
                    next_visible = Some(next_visible.map_or(until, |w| w.min(until)));
                    i += 1;
                    continue;
                }
            }
            if inner.messages[i].receive_count >= self.max_receive_count {
                let msg = inner.messages.remove(i);
                tracing::warn!(
                    msg_id = msg.id,
                    receive_count = msg.receive_count,
                    "receive limit reached, message dead-lettered"
                );
                inner.dead.push(msg);
                continue;
            }
            let msg = &mut inner.messages[i];
            msg.receive_count += 1;
            msg.invisible_until = Some(now + self.visibility_timeout);
            batch.push(Delivery {
                id: MessageId(msg.id),
                body: msg.body.clone(),
                receive_count: msg.receive_count,
                enqueued_at: msg.enqueued_at,
            });
            i += 1;
        }
        (batch, next_visible)
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, body: &str) -> Result<MessageId> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.messages.push(Message {
            id,
            body: body.to_string(),
            receive_count: 0,
            enqueued_at: Utc::now(),
            invisible_until: None,
        });
        self.notify.notify_waiters();
        Ok(MessageId(id))
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            // Arm the wakeup before scanning so an enqueue racing the
            // scan is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_visible) = {
                let mut inner = self.inner.lock().await;
                self.take_visible(&mut inner, max)
            };
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wake = next_visible.map_or(deadline, |v| v.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn acknowledge(&self, id: MessageId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.id != id.0);
        if inner.messages.len() == before {
            tracing::debug!(msg_id = id.0, "acknowledge: message already gone");
        }
        Ok(())
    }

    async fn extend_visibility(&self, id: MessageId, duration: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(msg) = inner.messages.iter_mut().find(|m| m.id == id.0) {
            msg.invisible_until = Some(Instant::now() + duration);
        }
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(pos) = inner.messages.iter().position(|m| m.id == id.0) {
            let msg = inner.messages.remove(pos);
            tracing::warn!(msg_id = msg.id, reason, "message dead-lettered");
            inner.dead.push(msg);
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<Delivery>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dead
            .iter()
            .map(|m| Delivery {
                id: MessageId(m.id),
                body: m.body.clone(),
                receive_count: m.receive_count,
                enqueued_at: m.enqueued_at,
            })
            .collect())
    }
}

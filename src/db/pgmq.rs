//! pgmq-backed work queue.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read_with_poll,
//! pgmq.set_vt, pgmq.delete. pgmq tracks the per-message read count and
//! visibility deadline; dead-lettering is a transactional move of the
//! message row into a second pgmq queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;

use super::Db;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::{Delivery, MessageId, WorkQueue};
use crate::telemetry::metrics;

/// Row shape of pgmq's message_record.
type MessageRow = (
    i64,
    i32,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
    serde_json::Value,
);

pub struct PgmqQueue {
    db: Arc<Db>,
    queue: String,
    dead_queue: String,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl PgmqQueue {
    /// Queue names are spliced into pgmq table names, so they are
    /// validated up front.
    pub fn new(
        db: Arc<Db>,
        queue: &str,
        dead_queue: &str,
        visibility_timeout: Duration,
        max_receive_count: u32,
    ) -> Result<Self> {
        validate_queue_name(queue)?;
        validate_queue_name(dead_queue)?;
        Ok(Self {
            db,
            queue: queue.to_string(),
            dead_queue: dead_queue.to_string(),
            visibility_timeout,
            max_receive_count,
        })
    }

    pub fn from_config(db: Arc<Db>, config: &Config) -> Result<Self> {
        Self::new(
            db,
            &config.queue_name,
            &config.dead_letter_queue_name(),
            config.visibility_timeout,
            config.max_receive_count,
        )
    }

    /// Create the live and dead-letter queues (idempotent).
    pub async fn ensure(&self) -> Result<()> {
        for name in [&self.queue, &self.dead_queue] {
            sqlx::query("SELECT pgmq.create($1)")
                .bind(name)
                .execute(self.db.pool())
                .await?;
            metrics::queue_operations().add(
                1,
                &[
                    KeyValue::new("queue", name.clone()),
                    KeyValue::new("operation", "create"),
                ],
            );
        }
        Ok(())
    }

    /// Atomically move one message from the live queue to the dead-letter
    /// queue, preserving its body. No-op if the message is already gone.
    async fn move_to_dead(&self, msg_id: i64, reason: &str) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let row: Option<(serde_json::Value,)> = sqlx::query_as(&format!(
            "SELECT message FROM pgmq.q_{} WHERE msg_id = $1",
            self.queue
        ))
        .bind(msg_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((message,)) = row else {
            return Ok(());
        };
        sqlx::query("SELECT pgmq.send($1, $2, $3)")
            .bind(&self.dead_queue)
            .bind(&message)
            .bind(0i32)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue)
            .bind(msg_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::warn!(msg_id, reason, queue = %self.queue, "message dead-lettered");
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for PgmqQueue {
    async fn enqueue(&self, body: &str) -> Result<MessageId> {
        // pgmq stores jsonb, so the body must parse.
        let payload: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| Error::Other(format!("queue body must be JSON: {e}")))?;
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(&self.queue)
            .bind(&payload)
            .bind(0i32)
            .fetch_one(self.db.pool())
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new("operation", "send"),
            ],
        );
        Ok(MessageId(row.0))
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT msg_id, read_ct, enqueued_at, vt, message
             FROM pgmq.read_with_poll($1, $2, $3, $4, $5)",
        )
        .bind(&self.queue)
        .bind(self.visibility_timeout.as_secs() as i32)
        .bind(max as i32)
        .bind(wait.as_secs().max(1) as i32)
        .bind(250i32) // poll interval ms
        .fetch_all(self.db.pool())
        .await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new(
                    "operation",
                    if rows.is_empty() { "read_empty" } else { "read" },
                ),
            ],
        );

        let mut deliveries = Vec::with_capacity(rows.len());
        for (msg_id, read_ct, enqueued_at, _vt, message) in rows {
            // read_ct counts this read too, so a message past its limit is
            // retired instead of handed out.
            if read_ct as u32 > self.max_receive_count {
                self.move_to_dead(msg_id, "receive limit reached").await?;
                metrics::dead_letters().add(1, &[KeyValue::new("reason", "receive_limit")]);
                continue;
            }
            deliveries.push(Delivery {
                id: MessageId(msg_id),
                body: message.to_string(),
                receive_count: read_ct as u32,
                enqueued_at,
            });
        }
        Ok(deliveries)
    }

    async fn acknowledge(&self, id: MessageId) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue)
            .bind(id.0)
            .execute(self.db.pool())
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new("operation", "delete"),
            ],
        );
        Ok(())
    }

    async fn extend_visibility(&self, id: MessageId, duration: Duration) -> Result<()> {
        sqlx::query("SELECT * FROM pgmq.set_vt($1, $2, $3)")
            .bind(&self.queue)
            .bind(id.0)
            .bind(duration.as_secs() as i32)
            .execute(self.db.pool())
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new("operation", "set_vt"),
            ],
        );
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<()> {
        self.move_to_dead(id.0, reason).await
    }

    async fn dead_letters(&self) -> Result<Vec<Delivery>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT msg_id, read_ct, enqueued_at, vt, message
             FROM pgmq.q_{} ORDER BY msg_id",
            self.dead_queue
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(msg_id, read_ct, enqueued_at, _vt, message)| Delivery {
                id: MessageId(msg_id),
                body: message.to_string(),
                receive_count: read_ct as u32,
                enqueued_at,
            })
            .collect())
    }
}

fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Config(format!(
            "invalid queue name '{name}': use ascii letters, digits, and underscore"
        )));
    }
    Ok(())
}

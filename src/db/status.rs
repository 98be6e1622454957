//! Postgres-backed job status timeline.
//!
//! Rows keyed (job_id, ts). The no-regress guard lives in the insert
//! statement itself so concurrent workers cannot race a finished job
//! back to an unfinished state.

use std::sync::Arc;

use async_trait::async_trait;

use super::Db;
use crate::error::Result;
use crate::model::{JobId, JobState};
use crate::status::{StatusRecord, StatusStore};

pub struct PgStatusStore {
    db: Arc<Db>,
}

impl PgStatusStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn put_status(
        &self,
        job_id: &JobId,
        timestamp_ms: i64,
        state: JobState,
        detail: &str,
    ) -> Result<()> {
        // Non-done writes are dropped once a done row exists; a done write
        // always lands. Same (job_id, ts) overwrites.
        sqlx::query(
            "INSERT INTO transcription_status (job_id, ts, state, detail)
             SELECT $1, $2, $3, $4
             WHERE $3 = 'done'
                OR NOT EXISTS (
                    SELECT 1 FROM transcription_status
                    WHERE job_id = $1 AND state = 'done'
                )
             ON CONFLICT (job_id, ts)
             DO UPDATE SET state = EXCLUDED.state, detail = EXCLUDED.detail",
        )
        .bind(job_id.as_str())
        .bind(timestamp_ms)
        .bind(state.as_str())
        .bind(detail)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn latest_status(&self, job_id: &JobId) -> Result<Option<StatusRecord>> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT ts, state, detail FROM transcription_status
             WHERE job_id = $1
             ORDER BY ts DESC
             LIMIT 1",
        )
        .bind(job_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        row.map(|(ts, state, detail)| {
            Ok(StatusRecord {
                job_id: job_id.clone(),
                timestamp_ms: ts,
                state: state.parse()?,
                detail,
            })
        })
        .transpose()
    }

    async fn history(&self, job_id: &JobId) -> Result<Vec<StatusRecord>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT ts, state, detail FROM transcription_status
             WHERE job_id = $1
             ORDER BY ts ASC",
        )
        .bind(job_id.as_str())
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter()
            .map(|(ts, state, detail)| {
                Ok(StatusRecord {
                    job_id: job_id.clone(),
                    timestamp_ms: ts,
                    state: state.parse()?,
                    detail,
                })
            })
            .collect()
    }
}

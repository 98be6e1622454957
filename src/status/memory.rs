//! In-memory status store for tests and local runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StatusRecord, StatusStore};
use crate::error::Result;
use crate::model::{JobId, JobState};

#[derive(Default)]
pub struct MemoryStatusStore {
    // job_id -> (timestamp_ms -> (state, detail)), ordered by timestamp
    rows: Mutex<HashMap<String, BTreeMap<i64, (JobState, String)>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put_status(
        &self,
        job_id: &JobId,
        timestamp_ms: i64,
        state: JobState,
        detail: &str,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let timeline = rows.entry(job_id.as_str().to_string()).or_default();
        let has_done = timeline.values().any(|(s, _)| *s == JobState::Done);
        if has_done && state != JobState::Done {
            return Ok(());
        }
        timeline.insert(timestamp_ms, (state, detail.to_string()));
        Ok(())
    }

    async fn latest_status(&self, job_id: &JobId) -> Result<Option<StatusRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(job_id.as_str()).and_then(|timeline| {
            timeline
                .last_key_value()
                .map(|(ts, (state, detail))| StatusRecord {
                    job_id: job_id.clone(),
                    timestamp_ms: *ts,
                    state: *state,
                    detail: detail.clone(),
                })
        }))
    }

    async fn history(&self, job_id: &JobId) -> Result<Vec<StatusRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(job_id.as_str())
            .map(|timeline| {
                timeline
                    .iter()
                    .map(|(ts, (state, detail))| StatusRecord {
                        job_id: job_id.clone(),
                        timestamp_ms: *ts,
                        state: *state,
                        detail: detail.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

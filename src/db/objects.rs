//! Postgres-backed object store.
//!
//! One `objects` table keyed (bucket, key), body as bytea. Put is an
//! upsert, which is what makes transcript writes idempotent.

use std::sync::Arc;

use async_trait::async_trait;

use super::Db;
use crate::error::Result;
use crate::store::{ObjectStore, StoredObject};

pub struct PgObjectStore {
    db: Arc<Db>,
}

impl PgObjectStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        let row: Option<(Vec<u8>, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
            "SELECT body, content_type, created_at FROM objects
             WHERE bucket = $1 AND key = $2",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|(bytes, content_type, created_at)| StoredObject {
            bytes,
            content_type,
            created_at,
        }))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO objects (bucket, key, body, content_type)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (bucket, key)
             DO UPDATE SET body = EXCLUDED.body, content_type = EXCLUDED.content_type",
        )
        .bind(bucket)
        .bind(key)
        .bind(&bytes)
        .bind(content_type)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT octet_length(body) FROM objects
             WHERE bucket = $1 AND key = $2",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|(len,)| len as u64))
    }
}

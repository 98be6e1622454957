//! In-memory object store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ObjectStore, StoredObject};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.lock().await;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let mut objects = self.objects.lock().await;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        let objects = self.objects.lock().await;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.len() as u64))
    }
}

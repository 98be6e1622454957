//! Object storage seam.
//!
//! Buckets of immutable blobs addressed by (bucket, key). The pipeline
//! reads audio from the source bucket and writes transcripts to the
//! destination bucket through this trait; backends are Postgres
//! ([`crate::db::PgObjectStore`]) or in-memory for tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use memory::MemoryObjectStore;

/// A stored blob with its metadata.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Blob storage. Writes are idempotent overwrites: putting the same key
/// twice leaves the last write, never an error and never a duplicate.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. `None` if absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>>;

    /// Write an object, replacing any previous content under the key.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<()>;

    /// Size of an object in bytes without fetching it. `None` if absent.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<u64>>;
}

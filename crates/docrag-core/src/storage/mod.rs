pub mod local;
pub mod s3;

pub use local::LocalRawStorage;
pub use s3::S3RawStorage;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;

/// An opened object: total size plus a readable handle whose lifetime is
/// tied to the response that streams it.
pub struct ObjectStream {
    pub size: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Blob store for the original uploaded bytes.
///
/// Paths are opaque `{workspace_id}/{document_id}-{sanitized_name}`
/// strings. Objects are immutable once written: `put` to an existing path
/// is an invariant violation, never an overwrite.
#[async_trait]
pub trait RawStorage: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Full object contents (pipeline side).
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Size plus a readable handle (download side).
    async fn open(&self, path: &str) -> Result<ObjectStream>;

    /// Idempotent: deleting a missing object is not an error, so cascade
    /// retries converge.
    async fn delete(&self, path: &str) -> Result<()>;

    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Select the raw storage backend: S3-compatible when `MINIO_ENDPOINT` is
/// set, local filesystem otherwise.
pub fn select_raw_storage(settings: &Settings) -> Result<Arc<dyn RawStorage>> {
    if settings.minio_configured() {
        let storage = S3RawStorage::from_settings(settings)?;
        info!(
            endpoint = settings.minio_endpoint.as_deref().unwrap_or_default(),
            bucket = %settings.minio_bucket_raw,
            "raw storage adapter: s3"
        );
        Ok(Arc::new(storage))
    } else {
        let root = settings.raw_storage_root();
        let storage = LocalRawStorage::new(&root)?;
        info!(root = %root, "raw storage adapter: local filesystem");
        Ok(Arc::new(storage))
    }
}

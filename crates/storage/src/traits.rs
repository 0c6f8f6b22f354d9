//! Blob storage traits.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use time::OffsetDateTime;

/// A stream of bytes from or to storage.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if known.
    pub last_modified: Option<OffsetDateTime>,
    /// Content type, if known.
    pub content_type: Option<String>,
}

/// Streaming upload handle returned by [`ObjectStore::put_stream`].
///
/// Data written before `finish` must not be visible under the object key;
/// `abort` discards everything written so far.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data to the upload.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Complete the upload, making the object visible. Returns total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload and discard written data.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Abstraction over blob storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Fetch object metadata. Returns `NotFound` if the object is absent.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Open a streaming read of the object. Returns `NotFound` if absent.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Begin a streaming upload to the given key.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete an object. Returns `NotFound` if it does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and writable.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

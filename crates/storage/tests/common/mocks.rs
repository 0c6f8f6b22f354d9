use async_trait::async_trait;
use bytes::Bytes;
use depot_storage::error::{StorageError, StorageResult};
use depot_storage::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend whose uploads fail after accepting a configurable number of writes.
///
/// Used to verify that a broken storage branch is never observable on the
/// client branch of a tee.
pub struct FailingUploadBackend {
    /// Writes accepted before the upload starts erroring.
    pub writes_before_failure: usize,
    pub aborts: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FailingUploadBackend {
    pub fn new(writes_before_failure: usize) -> Arc<Self> {
        Arc::new(Self {
            writes_before_failure,
            aborts: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FailingUploadBackend {
    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn put_stream(&self, _key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Ok(Box::new(FailingUpload {
            writes_left: self.writes_before_failure,
            aborts: self.aborts.clone(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Err(StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing-mock"
    }
}

struct FailingUpload {
    writes_left: usize,
    aborts: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamingUpload for FailingUpload {
    async fn write(&mut self, _data: Bytes) -> StorageResult<()> {
        if self.writes_left == 0 {
            return Err(StorageError::Upload("simulated write failure".to_string()));
        }
        self.writes_left -= 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        Err(StorageError::Upload("simulated finish failure".to_string()))
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Local filesystem storage backend.
//!
//! Objects live under a root directory, with the storage key mapped onto a
//! relative path. Uploads are written to a temporary file and renamed into
//! place on `finish`, so readers never observe partial objects.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read chunk size for streamed downloads.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem-backed object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at the given directory.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Map a storage key to a path under the root.
    ///
    /// Rejects absolute keys and any key containing `..` or other
    /// non-normal components so keys cannot escape the root.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "key contains invalid path component: {key}"
                    )));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        let last_modified = metadata
            .modified()
            .ok()
            .map(OffsetDateTime::from);
        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified,
            content_type: None,
        })
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_path(key)?;
        let mut file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let stream = async_stream::try_stream! {
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(Box::pin(stream))
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let final_path = self.key_path(key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = final_path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;
        Ok(Box::new(FilesystemUpload {
            file: Some(file),
            temp_path,
            final_path,
            bytes_written: 0,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

struct FilesystemUpload {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Upload("upload already finished".to_string()))?;
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StorageError::Upload("upload already finished".to_string()))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(StorageError::Io(e));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
        (dir, backend)
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.key_path("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            backend.key_path("/absolute"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            backend.key_path(""),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn aborted_upload_leaves_nothing() {
        let (_dir, backend) = backend().await;
        let mut upload = backend.put_stream("mods/1/file.zip").await.expect("put");
        upload.write(Bytes::from_static(b"partial")).await.expect("write");
        upload.abort().await.expect("abort");
        assert!(!backend.exists("mods/1/file.zip").await.expect("exists"));
    }

    #[tokio::test]
    async fn partial_upload_is_invisible() {
        let (_dir, backend) = backend().await;
        let mut upload = backend.put_stream("mods/1/file.zip").await.expect("put");
        upload.write(Bytes::from_static(b"data")).await.expect("write");
        // Not finished yet: the key must not resolve.
        assert!(!backend.exists("mods/1/file.zip").await.expect("exists"));
        upload.finish().await.expect("finish");
        assert!(backend.exists("mods/1/file.zip").await.expect("exists"));
    }
}

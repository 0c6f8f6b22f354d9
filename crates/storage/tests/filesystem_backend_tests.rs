//! Filesystem backend integration tests.

use bytes::Bytes;
use depot_storage::error::StorageError;
use depot_storage::traits::ObjectStore;
use depot_storage::FilesystemBackend;
use futures::StreamExt;

async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
    (dir, backend)
}

async fn put(backend: &FilesystemBackend, key: &str, data: &[u8]) {
    let mut upload = backend.put_stream(key).await.expect("put_stream");
    upload
        .write(Bytes::copy_from_slice(data))
        .await
        .expect("write");
    upload.finish().await.expect("finish");
}

#[tokio::test]
async fn roundtrip_and_head() {
    let (_dir, backend) = backend().await;
    put(&backend, "mods/7/pack.zip", b"payload bytes").await;

    assert!(backend.exists("mods/7/pack.zip").await.expect("exists"));
    let meta = backend.head("mods/7/pack.zip").await.expect("head");
    assert_eq!(meta.size, 13);

    let mut stream = backend.get_stream("mods/7/pack.zip").await.expect("get");
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.expect("chunk"));
    }
    assert_eq!(out, b"payload bytes");
}

#[tokio::test]
async fn missing_objects_report_not_found() {
    let (_dir, backend) = backend().await;

    assert!(matches!(
        backend.head("missing").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        backend.get_stream("missing").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        backend.delete("missing").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_removes_object() {
    let (_dir, backend) = backend().await;
    put(&backend, "mods/7/pack.zip", b"data").await;

    backend.delete("mods/7/pack.zip").await.expect("delete");
    assert!(!backend.exists("mods/7/pack.zip").await.expect("exists"));
}

#[tokio::test]
async fn finish_replaces_existing_object() {
    let (_dir, backend) = backend().await;
    put(&backend, "mods/7/pack.zip", b"old contents").await;
    put(&backend, "mods/7/pack.zip", b"new").await;

    let meta = backend.head("mods/7/pack.zip").await.expect("head");
    assert_eq!(meta.size, 3);
}

#[tokio::test]
async fn health_check_passes_on_valid_root() {
    let (_dir, backend) = backend().await;
    backend.health_check().await.expect("healthy");
}

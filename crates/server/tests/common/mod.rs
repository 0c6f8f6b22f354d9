//! Shared test fixtures.

// Not every test binary uses every fixture.
#![allow(dead_code)]

pub mod origin;
pub mod server;

use bytes::Bytes;
use depot_catalog::models::{MirroredFileRow, OriginDownloadRow};
use depot_storage::ObjectStore;
use time::OffsetDateTime;
use uuid::Uuid;

/// Write a blob directly into storage.
pub async fn put_object(storage: &dyn ObjectStore, key: &str, data: Bytes) {
    let mut upload = storage.put_stream(key).await.expect("put_stream");
    upload.write(data).await.expect("write");
    upload.finish().await.expect("finish");
}

/// Build an origin download record for tests.
pub fn origin_row(
    mod_id: &str,
    file_id: &str,
    url: &str,
    size: i64,
    remote_id: &str,
    file: &str,
) -> OriginDownloadRow {
    OriginDownloadRow {
        mod_id: mod_id.to_string(),
        file_id: file_id.to_string(),
        url: url.to_string(),
        size,
        remote_id: remote_id.to_string(),
        file: file.to_string(),
    }
}

/// Build a mirrored file row for tests.
pub fn mirrored_row(
    mod_id: &str,
    file_id: &str,
    remote_id: &str,
    filename: &str,
    s3_key: &str,
    size: i64,
) -> MirroredFileRow {
    let now = OffsetDateTime::now_utc();
    MirroredFileRow {
        id: Uuid::new_v4(),
        mod_id: mod_id.to_string(),
        mod_download_id: file_id.to_string(),
        remote_id: remote_id.to_string(),
        filename: filename.to_string(),
        s3_key: s3_key.to_string(),
        s3_bucket: "filesystem".to_string(),
        file_hash: "deadbeef".to_string(),
        file_size: size,
        mirrored_at: now,
        last_downloaded_at: now,
        last_validated: None,
        is_stale: false,
    }
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_for<F, Fut>(timeout: std::time::Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}

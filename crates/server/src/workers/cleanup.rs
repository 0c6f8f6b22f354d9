//! Periodic removal of mirrored files nobody has downloaded recently.

use super::delete_blob_tolerant;
use depot_catalog::{CatalogStore, MirroredFileRepo};
use depot_storage::ObjectStore;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Outcome of one cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub files_checked: u64,
    pub files_deleted: u64,
    pub storage_freed_mb: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

/// Deletes mirrored files whose last download is older than the retention
/// window. Deleted files are re-mirrored on the next request for them.
pub struct CleanupWorker {
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    retention: time::Duration,
    concurrency: usize,
}

impl CleanupWorker {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        retention: time::Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            catalog,
            retention,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self) -> CleanupSummary {
        let started = Instant::now();
        let cutoff = OffsetDateTime::now_utc() - self.retention;
        let files = match self.catalog.find_unused(cutoff).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "cleanup pass could not list unused files");
                return CleanupSummary {
                    errors: 1,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
            }
        };

        let checked = files.len() as u64;
        let deleted = AtomicU64::new(0);
        let freed_bytes = AtomicU64::new(0);
        let errors = AtomicU64::new(0);

        stream::iter(files)
            .for_each_concurrent(self.concurrency, |file| {
                let deleted = &deleted;
                let freed_bytes = &freed_bytes;
                let errors = &errors;
                async move {
                    let size = file.file_size.max(0) as u64;
                    let result = async {
                        delete_blob_tolerant(self.storage.as_ref(), &file.s3_key).await?;
                        self.catalog.delete_mirrored_file(file.id).await?;
                        Ok::<_, super::WorkerError>(())
                    }
                    .await;
                    match result {
                        Ok(()) => {
                            deleted.fetch_add(1, Ordering::Relaxed);
                            freed_bytes.fetch_add(size, Ordering::Relaxed);
                            tracing::info!(
                                mod_id = file.mod_id,
                                file_id = file.mod_download_id,
                                key = file.s3_key,
                                size,
                                "unused mirrored file removed"
                            );
                        }
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                mod_id = file.mod_id,
                                file_id = file.mod_download_id,
                                key = file.s3_key,
                                error = %e,
                                "cleanup failed for mirrored file"
                            );
                        }
                    }
                }
            })
            .await;

        let summary = CleanupSummary {
            files_checked: checked,
            files_deleted: deleted.into_inner(),
            storage_freed_mb: freed_bytes.into_inner() / 1_048_576,
            errors: errors.into_inner(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            files_checked = summary.files_checked,
            files_deleted = summary.files_deleted,
            storage_freed_mb = summary.storage_freed_mb,
            errors = summary.errors,
            duration_ms = summary.duration_ms,
            "cleanup pass complete"
        );
        summary
    }
}

//! Periodic validation of mirrored files against their origin records.

use super::{delete_blob_tolerant, WorkerError};
use depot_catalog::{CatalogStore, MirroredFileRepo};
use depot_storage::ObjectStore;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Outcome of one validation pass.
#[derive(Debug, Default)]
pub struct ValidationSummary {
    pub files_checked: u64,
    pub stale_files_found: u64,
    pub files_deleted: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

/// Walks every mirrored file and reconciles it with its origin record.
///
/// A file whose origin record disappeared is deleted outright; one whose
/// origin size no longer matches is marked stale so the next download
/// re-mirrors it. Matching files get their validation timestamp refreshed.
pub struct ValidationWorker {
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    concurrency: usize,
}

impl ValidationWorker {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            catalog,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self) -> ValidationSummary {
        let started = Instant::now();
        let files = match self.catalog.find_all_with_origins().await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "validation pass could not list mirrored files");
                return ValidationSummary {
                    errors: 1,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
            }
        };

        let checked = AtomicU64::new(0);
        let stale = AtomicU64::new(0);
        let deleted = AtomicU64::new(0);
        let errors = AtomicU64::new(0);

        stream::iter(files)
            .for_each_concurrent(self.concurrency, |entry| {
                let checked = &checked;
                let stale = &stale;
                let deleted = &deleted;
                let errors = &errors;
                async move {
                    checked.fetch_add(1, Ordering::Relaxed);
                    let mod_id = entry.file.mod_id.clone();
                    let file_id = entry.file.mod_download_id.clone();
                    let key = entry.file.s3_key.clone();
                    match self.validate_one(entry).await {
                        Ok(Outcome::Valid) => {}
                        Ok(Outcome::Stale) => {
                            // The drifted blob was deleted, so it counts in
                            // both tallies.
                            stale.fetch_add(1, Ordering::Relaxed);
                            deleted.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Outcome::Deleted) => {
                            deleted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                mod_id,
                                file_id,
                                key,
                                error = %e,
                                "validation failed for mirrored file"
                            );
                        }
                    }
                }
            })
            .await;

        let summary = ValidationSummary {
            files_checked: checked.into_inner(),
            stale_files_found: stale.into_inner(),
            files_deleted: deleted.into_inner(),
            errors: errors.into_inner(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            files_checked = summary.files_checked,
            stale_files_found = summary.stale_files_found,
            files_deleted = summary.files_deleted,
            errors = summary.errors,
            duration_ms = summary.duration_ms,
            "validation pass complete"
        );
        summary
    }

    async fn validate_one(
        &self,
        entry: depot_catalog::models::MirroredFileWithOrigin,
    ) -> Result<Outcome, WorkerError> {
        let file = entry.file;
        match entry.origin {
            None => {
                delete_blob_tolerant(self.storage.as_ref(), &file.s3_key).await?;
                self.catalog.delete_mirrored_file(file.id).await?;
                tracing::info!(
                    mod_id = file.mod_id,
                    file_id = file.mod_download_id,
                    "origin record gone, mirrored file removed"
                );
                Ok(Outcome::Deleted)
            }
            Some(origin) if origin.size != file.file_size => {
                delete_blob_tolerant(self.storage.as_ref(), &file.s3_key).await?;
                self.catalog
                    .mark_stale(file.id, OffsetDateTime::now_utc())
                    .await?;
                tracing::info!(
                    mod_id = file.mod_id,
                    file_id = file.mod_download_id,
                    catalog_size = file.file_size,
                    origin_size = origin.size,
                    "origin size changed, mirrored file marked stale"
                );
                Ok(Outcome::Stale)
            }
            Some(_) => {
                self.catalog
                    .touch_validated(file.id, OffsetDateTime::now_utc())
                    .await?;
                Ok(Outcome::Valid)
            }
        }
    }
}

enum Outcome {
    Valid,
    Stale,
    Deleted,
}

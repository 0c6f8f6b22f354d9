//! Mirrored file repository.

use crate::error::CatalogResult;
use crate::models::{MirroredFileRow, MirroredFileWithOrigin, StorageTotals};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for mirrored file records.
#[async_trait]
pub trait MirroredFileRepo: Send + Sync {
    /// Insert a mirrored file, or replace the existing row for the same
    /// `(mod_id, mod_download_id)`. On conflict the original `id` is kept and
    /// `is_stale` is reset, so a re-mirror revives a stale row in place.
    async fn upsert_mirrored_file(&self, row: &MirroredFileRow) -> CatalogResult<()>;

    /// Find a non-stale mirrored file for the hit path.
    async fn find_active_by_mod_and_file(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<MirroredFileRow>>;

    /// Find a mirrored file regardless of staleness.
    async fn find_by_mod_and_file(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<MirroredFileRow>>;

    /// Record that the file was served to a client.
    async fn touch_last_downloaded(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()>;

    /// Record a successful validation pass.
    async fn touch_validated(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()>;

    /// Mark a file stale after its blob was deleted due to origin drift.
    async fn mark_stale(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()>;

    /// Delete a mirrored file record.
    async fn delete_mirrored_file(&self, id: Uuid) -> CatalogResult<()>;

    /// Files not downloaded since the cutoff, oldest first.
    async fn find_unused(&self, cutoff: OffsetDateTime) -> CatalogResult<Vec<MirroredFileRow>>;

    /// All mirrored files paired with their origin records, for validation.
    async fn find_all_with_origins(&self) -> CatalogResult<Vec<MirroredFileWithOrigin>>;

    /// Aggregate file count and byte total.
    async fn storage_totals(&self) -> CatalogResult<StorageTotals>;
}

//! Origin download repository.

use crate::error::CatalogResult;
use crate::models::OriginDownloadRow;
use async_trait::async_trait;

/// Repository for origin download records.
///
/// These rows are the source of truth for what may be mirrored: a request for
/// a pair with no origin record is a 404, never an origin fetch.
#[async_trait]
pub trait OriginDownloadRepo: Send + Sync {
    /// Look up the origin record for a (mod, file) pair.
    async fn find_origin(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<OriginDownloadRow>>;

    /// All origin records.
    async fn list_origins(&self) -> CatalogResult<Vec<OriginDownloadRow>>;

    /// Insert or replace an origin record.
    async fn upsert_origin(&self, row: &OriginDownloadRow) -> CatalogResult<()>;

    /// Remove an origin record.
    async fn delete_origin(&self, mod_id: &str, file_id: &str) -> CatalogResult<()>;
}

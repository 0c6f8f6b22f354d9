//! Persistent metric counters.

use crate::error::CatalogResult;
use crate::models::TopDownloadRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Counter key for cache hits.
pub const CACHE_HITS_KEY: &str = "cache_hits";

/// Counter key for cache misses.
pub const CACHE_MISSES_KEY: &str = "cache_misses";

/// Repository for metric counters and per-file download counts.
///
/// Counters live in the catalog database so they survive restarts and are
/// shared by every server instance pointing at the same database.
#[async_trait]
pub trait CounterRepo: Send + Sync {
    /// Add `by` to a named counter, creating it at zero first if needed.
    async fn increment_counter(&self, key: &str, by: i64) -> CatalogResult<()>;

    /// Read a named counter. Missing counters read as zero.
    async fn get_counter(&self, key: &str) -> CatalogResult<i64>;

    /// Bump the download count for a mirrored file.
    async fn increment_download(&self, file_id: Uuid) -> CatalogResult<()>;

    /// Most-downloaded files, highest first.
    async fn top_downloads(&self, limit: i64) -> CatalogResult<Vec<TopDownloadRow>>;
}

//! Durable mirror metrics backed by the catalog database.
//!
//! Hit/miss counters and download counts survive restarts and are shared by
//! every instance pointing at the same catalog. Recording is fire-and-forget:
//! a counter write failure is logged and never fails a download.

use crate::metrics;
use depot_catalog::models::TopDownloadRow;
use depot_catalog::repos::{CACHE_HITS_KEY, CACHE_MISSES_KEY};
use depot_catalog::{CatalogResult, CatalogStore, CounterRepo, MirroredFileRepo};
use serde::Serialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Aggregate metrics served by the JSON endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Hit percentage over all recorded downloads (0.0 when none).
    pub cache_hit_rate: f64,
    /// Total bytes of mirrored files currently in the catalog.
    pub total_storage_used: i64,
    /// Number of mirrored files.
    pub total_files: i64,
    /// Estimated origin bytes saved by serving hits locally.
    pub bandwidth_saved: i64,
    pub top_downloads: Vec<TopDownloadRow>,
    /// RFC 3339 timestamp of the snapshot.
    pub timestamp: String,
}

/// Catalog-backed metrics recorder and reader.
pub struct MetricsStore {
    catalog: Arc<dyn CatalogStore>,
}

impl MetricsStore {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Record a download served from blob storage.
    pub async fn record_cache_hit(&self) {
        metrics::CACHE_HITS.inc();
        if let Err(e) = self.catalog.increment_counter(CACHE_HITS_KEY, 1).await {
            tracing::warn!(error = %e, "failed to persist cache hit counter");
        }
    }

    /// Record a download that required an origin fetch.
    pub async fn record_cache_miss(&self) {
        metrics::CACHE_MISSES.inc();
        if let Err(e) = self.catalog.increment_counter(CACHE_MISSES_KEY, 1).await {
            tracing::warn!(error = %e, "failed to persist cache miss counter");
        }
    }

    /// Record a completed download of a specific mirrored file.
    pub async fn record_download(&self, file_id: Uuid) {
        if let Err(e) = self.catalog.increment_download(file_id).await {
            tracing::warn!(file_id = %file_id, error = %e, "failed to persist download count");
        }
    }

    /// Hit percentage over all recorded downloads. Zero when nothing was recorded.
    pub async fn cache_hit_rate(&self) -> CatalogResult<f64> {
        let hits = self.catalog.get_counter(CACHE_HITS_KEY).await?;
        let misses = self.catalog.get_counter(CACHE_MISSES_KEY).await?;
        let total = hits + misses;
        if total == 0 {
            return Ok(0.0);
        }
        Ok(hits as f64 / total as f64 * 100.0)
    }

    /// Estimated origin bytes saved: hits times the current average file size.
    pub async fn bandwidth_saved(&self) -> CatalogResult<i64> {
        let hits = self.catalog.get_counter(CACHE_HITS_KEY).await?;
        let totals = self.catalog.storage_totals().await?;
        if totals.total_files == 0 {
            return Ok(0);
        }
        let average = totals.total_bytes / totals.total_files;
        Ok(hits.saturating_mul(average))
    }

    /// Build the full snapshot for the JSON endpoint.
    pub async fn snapshot(&self, top_limit: i64) -> CatalogResult<MetricsSnapshot> {
        let cache_hit_rate = self.cache_hit_rate().await?;
        let totals = self.catalog.storage_totals().await?;
        let bandwidth_saved = self.bandwidth_saved().await?;
        let top_downloads = self.catalog.top_downloads(top_limit).await?;

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::new());

        Ok(MetricsSnapshot {
            cache_hit_rate,
            total_storage_used: totals.total_bytes,
            total_files: totals.total_files,
            bandwidth_saved,
            top_downloads,
            timestamp,
        })
    }
}

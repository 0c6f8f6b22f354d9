//! Catalog row types.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A file mirrored into blob storage.
///
/// A row exists only after the storage upload completed; the miss path
/// creates it last. `(mod_id, mod_download_id)` is unique, and a re-mirror
/// upserts over the existing row while keeping its id.
#[derive(Debug, Clone, FromRow)]
pub struct MirroredFileRow {
    pub id: Uuid,
    /// Mod identifier as requested by clients.
    pub mod_id: String,
    /// Download (file) identifier within the mod.
    pub mod_download_id: String,
    /// Identifier of the mod on the remote host, used in the storage key.
    pub remote_id: String,
    pub filename: String,
    pub s3_key: String,
    pub s3_bucket: String,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub file_hash: String,
    pub file_size: i64,
    pub mirrored_at: OffsetDateTime,
    pub last_downloaded_at: OffsetDateTime,
    pub last_validated: Option<OffsetDateTime>,
    /// Set when validation found the origin drifted; the blob is gone and the
    /// next miss re-mirrors.
    pub is_stale: bool,
}

/// An origin download record: where a (mod, file) pair can be fetched from.
#[derive(Debug, Clone, FromRow)]
pub struct OriginDownloadRow {
    pub mod_id: String,
    pub file_id: String,
    /// Absolute origin URL.
    pub url: String,
    /// Expected size in bytes, as published by the origin.
    pub size: i64,
    /// Remote host identifier of the mod.
    pub remote_id: String,
    /// Filename on the remote host.
    pub file: String,
}

/// A mirrored file joined with its origin record, if one still exists.
#[derive(Debug, Clone)]
pub struct MirroredFileWithOrigin {
    pub file: MirroredFileRow,
    pub origin: Option<OriginDownloadRow>,
}

/// One entry of the download leaderboard.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDownloadRow {
    pub file_id: Uuid,
    pub filename: String,
    pub downloads: i64,
}

/// Aggregate storage usage.
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct StorageTotals {
    pub total_files: i64,
    pub total_bytes: i64,
}

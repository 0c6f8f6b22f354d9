//! Catalog store trait and SQLite implementation.

use crate::error::CatalogResult;
use crate::models::{
    MirroredFileRow, MirroredFileWithOrigin, OriginDownloadRow, StorageTotals, TopDownloadRow,
};
use crate::repos::{join_origins, CounterRepo, MirroredFileRepo, OriginDownloadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined catalog store trait.
#[async_trait]
pub trait CatalogStore: MirroredFileRepo + OriginDownloadRepo + CounterRepo + Send + Sync {
    /// Run schema migrations.
    async fn migrate(&self) -> CatalogResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> CatalogResult<()>;
}

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mirrored_files (
    id BLOB PRIMARY KEY,
    mod_id TEXT NOT NULL,
    mod_download_id TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    s3_key TEXT NOT NULL,
    s3_bucket TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    mirrored_at TEXT NOT NULL,
    last_downloaded_at TEXT NOT NULL,
    last_validated TEXT,
    is_stale INTEGER NOT NULL DEFAULT 0,
    UNIQUE (mod_id, mod_download_id)
);

CREATE INDEX IF NOT EXISTS idx_mirrored_files_last_downloaded
    ON mirrored_files(last_downloaded_at);

CREATE TABLE IF NOT EXISTS origin_downloads (
    mod_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    url TEXT NOT NULL,
    size INTEGER NOT NULL,
    remote_id TEXT NOT NULL,
    file TEXT NOT NULL,
    PRIMARY KEY (mod_id, file_id)
);

CREATE TABLE IF NOT EXISTS metric_counters (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS download_counts (
    mirrored_file_id BLOB PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0
);
"#;

/// SQLite-based catalog store.
///
/// Intended for testing and single-node deployments; use PostgreSQL
/// when multiple server instances share a catalog.
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Create a new SQLite catalog, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::raw_sql(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MirroredFileRepo for SqliteCatalog {
    async fn upsert_mirrored_file(&self, row: &MirroredFileRow) -> CatalogResult<()> {
        // On conflict the original id is kept so download counts carry over.
        sqlx::query(
            r#"
            INSERT INTO mirrored_files (
                id, mod_id, mod_download_id, remote_id, filename, s3_key, s3_bucket,
                file_hash, file_size, mirrored_at, last_downloaded_at, last_validated, is_stale
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (mod_id, mod_download_id) DO UPDATE SET
                remote_id = excluded.remote_id,
                filename = excluded.filename,
                s3_key = excluded.s3_key,
                s3_bucket = excluded.s3_bucket,
                file_hash = excluded.file_hash,
                file_size = excluded.file_size,
                mirrored_at = excluded.mirrored_at,
                last_downloaded_at = excluded.last_downloaded_at,
                last_validated = NULL,
                is_stale = 0
            "#,
        )
        .bind(row.id)
        .bind(&row.mod_id)
        .bind(&row.mod_download_id)
        .bind(&row.remote_id)
        .bind(&row.filename)
        .bind(&row.s3_key)
        .bind(&row.s3_bucket)
        .bind(&row.file_hash)
        .bind(row.file_size)
        .bind(row.mirrored_at)
        .bind(row.last_downloaded_at)
        .bind(row.last_validated)
        .bind(row.is_stale)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_by_mod_and_file(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<MirroredFileRow>> {
        let row = sqlx::query_as::<_, MirroredFileRow>(
            "SELECT * FROM mirrored_files
             WHERE mod_id = ? AND mod_download_id = ? AND is_stale = 0",
        )
        .bind(mod_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_mod_and_file(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<MirroredFileRow>> {
        let row = sqlx::query_as::<_, MirroredFileRow>(
            "SELECT * FROM mirrored_files WHERE mod_id = ? AND mod_download_id = ?",
        )
        .bind(mod_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn touch_last_downloaded(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE mirrored_files SET last_downloaded_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_validated(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE mirrored_files SET last_validated = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_stale(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE mirrored_files SET is_stale = 1, last_validated = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_mirrored_file(&self, id: Uuid) -> CatalogResult<()> {
        sqlx::query("DELETE FROM download_counts WHERE mirrored_file_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM mirrored_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_unused(&self, cutoff: OffsetDateTime) -> CatalogResult<Vec<MirroredFileRow>> {
        let rows = sqlx::query_as::<_, MirroredFileRow>(
            "SELECT * FROM mirrored_files
             WHERE last_downloaded_at < ?
             ORDER BY last_downloaded_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_all_with_origins(&self) -> CatalogResult<Vec<MirroredFileWithOrigin>> {
        let files = sqlx::query_as::<_, MirroredFileRow>("SELECT * FROM mirrored_files")
            .fetch_all(&self.pool)
            .await?;
        let origins = self.list_origins().await?;
        Ok(join_origins(files, origins))
    }

    async fn storage_totals(&self) -> CatalogResult<StorageTotals> {
        let totals = sqlx::query_as::<_, StorageTotals>(
            "SELECT COUNT(*) AS total_files, COALESCE(SUM(file_size), 0) AS total_bytes
             FROM mirrored_files",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}

#[async_trait]
impl OriginDownloadRepo for SqliteCatalog {
    async fn find_origin(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<OriginDownloadRow>> {
        let row = sqlx::query_as::<_, OriginDownloadRow>(
            "SELECT * FROM origin_downloads WHERE mod_id = ? AND file_id = ?",
        )
        .bind(mod_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_origins(&self) -> CatalogResult<Vec<OriginDownloadRow>> {
        let rows = sqlx::query_as::<_, OriginDownloadRow>("SELECT * FROM origin_downloads")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn upsert_origin(&self, row: &OriginDownloadRow) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO origin_downloads (mod_id, file_id, url, size, remote_id, file)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (mod_id, file_id) DO UPDATE SET
                url = excluded.url,
                size = excluded.size,
                remote_id = excluded.remote_id,
                file = excluded.file
            "#,
        )
        .bind(&row.mod_id)
        .bind(&row.file_id)
        .bind(&row.url)
        .bind(row.size)
        .bind(&row.remote_id)
        .bind(&row.file)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_origin(&self, mod_id: &str, file_id: &str) -> CatalogResult<()> {
        sqlx::query("DELETE FROM origin_downloads WHERE mod_id = ? AND file_id = ?")
            .bind(mod_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CounterRepo for SqliteCatalog {
    async fn increment_counter(&self, key: &str, by: i64) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO metric_counters (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = metric_counters.value + excluded.value",
        )
        .bind(key)
        .bind(by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_counter(&self, key: &str) -> CatalogResult<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM metric_counters WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or(0))
    }

    async fn increment_download(&self, file_id: Uuid) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO download_counts (mirrored_file_id, count) VALUES (?, 1)
             ON CONFLICT (mirrored_file_id) DO UPDATE SET count = download_counts.count + 1",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn top_downloads(&self, limit: i64) -> CatalogResult<Vec<TopDownloadRow>> {
        let rows = sqlx::query_as::<_, TopDownloadRow>(
            "SELECT m.id AS file_id, m.filename AS filename, d.count AS downloads
             FROM download_counts d
             JOIN mirrored_files m ON m.id = d.mirrored_file_id
             ORDER BY d.count DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

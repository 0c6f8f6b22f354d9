//! PostgreSQL catalog store.

use crate::error::CatalogResult;
use crate::models::{
    MirroredFileRow, MirroredFileWithOrigin, OriginDownloadRow, StorageTotals, TopDownloadRow,
};
use crate::repos::{join_origins, CounterRepo, MirroredFileRepo, OriginDownloadRepo};
use crate::store::CatalogStore;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

const PG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mirrored_files (
    id UUID PRIMARY KEY,
    mod_id TEXT NOT NULL,
    mod_download_id TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    s3_key TEXT NOT NULL,
    s3_bucket TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    file_size BIGINT NOT NULL,
    mirrored_at TIMESTAMPTZ NOT NULL,
    last_downloaded_at TIMESTAMPTZ NOT NULL,
    last_validated TIMESTAMPTZ,
    is_stale BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (mod_id, mod_download_id)
);

CREATE INDEX IF NOT EXISTS idx_mirrored_files_last_downloaded
    ON mirrored_files(last_downloaded_at);

CREATE TABLE IF NOT EXISTS origin_downloads (
    mod_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    url TEXT NOT NULL,
    size BIGINT NOT NULL,
    remote_id TEXT NOT NULL,
    file TEXT NOT NULL,
    PRIMARY KEY (mod_id, file_id)
);

CREATE TABLE IF NOT EXISTS metric_counters (
    key TEXT PRIMARY KEY,
    value BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS download_counts (
    mirrored_file_id UUID PRIMARY KEY,
    count BIGINT NOT NULL DEFAULT 0
);
"#;

/// PostgreSQL-based catalog store.
pub struct PostgresCatalog {
    pool: Pool<Postgres>,
}

impl PostgresCatalog {
    /// Connect to PostgreSQL and run migrations.
    pub async fn from_url(url: &str, max_connections: u32) -> CatalogResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalog {
    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::raw_sql(PG_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MirroredFileRepo for PostgresCatalog {
    async fn upsert_mirrored_file(&self, row: &MirroredFileRow) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO mirrored_files (
                id, mod_id, mod_download_id, remote_id, filename, s3_key, s3_bucket,
                file_hash, file_size, mirrored_at, last_downloaded_at, last_validated, is_stale
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
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
                is_stale = FALSE
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
             WHERE mod_id = $1 AND mod_download_id = $2 AND is_stale = FALSE",
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
            "SELECT * FROM mirrored_files WHERE mod_id = $1 AND mod_download_id = $2",
        )
        .bind(mod_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn touch_last_downloaded(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE mirrored_files SET last_downloaded_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_validated(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query("UPDATE mirrored_files SET last_validated = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_stale(&self, id: Uuid, at: OffsetDateTime) -> CatalogResult<()> {
        sqlx::query(
            "UPDATE mirrored_files SET is_stale = TRUE, last_validated = $1 WHERE id = $2",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_mirrored_file(&self, id: Uuid) -> CatalogResult<()> {
        sqlx::query("DELETE FROM download_counts WHERE mirrored_file_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM mirrored_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_unused(&self, cutoff: OffsetDateTime) -> CatalogResult<Vec<MirroredFileRow>> {
        let rows = sqlx::query_as::<_, MirroredFileRow>(
            "SELECT * FROM mirrored_files
             WHERE last_downloaded_at < $1
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
            "SELECT COUNT(*) AS total_files,
                    COALESCE(SUM(file_size), 0)::BIGINT AS total_bytes
             FROM mirrored_files",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}

#[async_trait]
impl OriginDownloadRepo for PostgresCatalog {
    async fn find_origin(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> CatalogResult<Option<OriginDownloadRow>> {
        let row = sqlx::query_as::<_, OriginDownloadRow>(
            "SELECT * FROM origin_downloads WHERE mod_id = $1 AND file_id = $2",
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
            VALUES ($1, $2, $3, $4, $5, $6)
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
        sqlx::query("DELETE FROM origin_downloads WHERE mod_id = $1 AND file_id = $2")
            .bind(mod_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CounterRepo for PostgresCatalog {
    async fn increment_counter(&self, key: &str, by: i64) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO metric_counters (key, value) VALUES ($1, $2)
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
            sqlx::query_scalar("SELECT value FROM metric_counters WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or(0))
    }

    async fn increment_download(&self, file_id: Uuid) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO download_counts (mirrored_file_id, count) VALUES ($1, 1)
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
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

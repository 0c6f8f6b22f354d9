//! Pull-through mirror orchestration.
//!
//! A download request resolves in one of two ways:
//!
//! * **Hit**: a non-stale catalog row exists; the file streams straight from
//!   blob storage while last-download metadata updates in the background.
//! * **Miss**: the origin URL is fetched and teed, serving the client while a
//!   copy uploads to storage. The catalog row is written only after the
//!   upload completes, so the catalog never points at a missing blob. The
//!   first request for which the mirror fails simply behaves like a proxy;
//!   the next miss retries the mirror.
//!
//! Concurrent misses for the same storage key are coalesced: the first
//! request drives the origin fetch and upload, later requests wait for it to
//! finish and then serve from storage. If the winner fails, waiters fall back
//! to an independent origin fetch. Client disconnects never cancel an upload
//! in progress.

use crate::metrics;
use crate::metrics_store::MetricsStore;
use depot_catalog::models::{MirroredFileRow, OriginDownloadRow};
use depot_catalog::{CatalogError, CatalogStore, MirroredFileRepo, OriginDownloadRepo};
use depot_core::config::OriginConfig;
use depot_core::keys::mirror_object_key;
use depot_storage::{tee_to_storage, ByteStream, ObjectStore, StorageError};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

/// Mirror operation errors.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("origin fetch failed: {0}")]
    Origin(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// A download ready to stream to a client.
pub struct MirroredDownload {
    pub stream: ByteStream,
    /// Value for the Content-Length header. Catalog size on hits, origin
    /// record size on misses.
    pub size: u64,
    pub filename: String,
}

/// Published state of an in-flight mirror: `None` while running, then the
/// terminal result.
type InflightState = Option<Result<(), String>>;
type InflightMap = Arc<Mutex<HashMap<String, watch::Receiver<InflightState>>>>;

enum InflightSlot {
    /// This request drives the mirror and publishes completion.
    Started(watch::Sender<InflightState>),
    /// Another request is already mirroring this key.
    Joined(watch::Receiver<InflightState>),
}

/// Orchestrates hit/miss resolution for download requests.
pub struct MirrorService {
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogStore>,
    metrics: Arc<MetricsStore>,
    http: reqwest::Client,
    bucket_label: String,
    inflight: InflightMap,
}

impl MirrorService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        metrics: Arc<MetricsStore>,
        origin_config: &OriginConfig,
        bucket_label: String,
    ) -> Result<Self, MirrorError> {
        let http = reqwest::Client::builder()
            .connect_timeout(origin_config.connect_timeout())
            .user_agent(origin_config.user_agent.clone())
            .build()?;

        Ok(Self {
            storage,
            catalog,
            metrics,
            http,
            bucket_label,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Resolve a download request to a byte stream.
    pub async fn mirror_file(
        &self,
        mod_id: &str,
        file_id: &str,
    ) -> Result<MirroredDownload, MirrorError> {
        if let Some(row) = self
            .catalog
            .find_active_by_mod_and_file(mod_id, file_id)
            .await?
        {
            tracing::debug!(mod_id, file_id, key = %row.s3_key, "cache hit");
            return self.serve_from_storage(row, true).await;
        }

        self.metrics.record_cache_miss().await;

        let origin = self
            .catalog
            .find_origin(mod_id, file_id)
            .await?
            .ok_or_else(|| {
                MirrorError::NotFound(format!("no origin download for mod {mod_id} file {file_id}"))
            })?;

        let key = mirror_object_key(&origin.remote_id, &origin.file);

        match self.register_inflight(&key).await {
            InflightSlot::Started(tx) => {
                tracing::info!(mod_id, file_id, key = %key, url = %origin.url, "cache miss, mirroring from origin");
                self.fetch_and_tee(mod_id, file_id, origin, key, Some(tx))
                    .await
            }
            InflightSlot::Joined(rx) => {
                tracing::debug!(mod_id, file_id, key = %key, "joining in-flight mirror");
                match await_inflight(rx).await {
                    Ok(()) => {
                        if let Some(row) = self
                            .catalog
                            .find_active_by_mod_and_file(mod_id, file_id)
                            .await?
                        {
                            return self.serve_from_storage(row, false).await;
                        }
                        tracing::warn!(
                            mod_id,
                            file_id,
                            key = %key,
                            "in-flight mirror finished without a catalog row, fetching independently"
                        );
                    }
                    Err(msg) => {
                        tracing::warn!(
                            mod_id,
                            file_id,
                            key = %key,
                            error = %msg,
                            "in-flight mirror failed, fetching independently"
                        );
                    }
                }
                self.fetch_and_tee(mod_id, file_id, origin, key, None).await
            }
        }
    }

    /// Stream a mirrored file from blob storage, updating metadata off the
    /// request path.
    async fn serve_from_storage(
        &self,
        row: MirroredFileRow,
        record_hit: bool,
    ) -> Result<MirroredDownload, MirrorError> {
        let stream = self.storage.get_stream(&row.s3_key).await?;

        let catalog = self.catalog.clone();
        let metrics = self.metrics.clone();
        let file_id = row.id;
        tokio::spawn(async move {
            if record_hit {
                metrics.record_cache_hit().await;
            }
            metrics.record_download(file_id).await;
            if let Err(e) = catalog
                .touch_last_downloaded(file_id, OffsetDateTime::now_utc())
                .await
            {
                tracing::warn!(file_id = %file_id, error = %e, "failed to update last_downloaded_at");
            }
        });

        Ok(MirroredDownload {
            stream,
            size: row.file_size as u64,
            filename: row.filename,
        })
    }

    /// Fetch the origin and tee it: the client gets the returned stream, the
    /// storage copy and catalog write happen in the background.
    async fn fetch_and_tee(
        &self,
        mod_id: &str,
        file_id: &str,
        origin: OriginDownloadRow,
        key: String,
        completion: Option<watch::Sender<InflightState>>,
    ) -> Result<MirroredDownload, MirrorError> {
        let response = match self.http.get(&origin.url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.finish_inflight(&key, completion, Err(e.to_string())).await;
                return Err(MirrorError::Origin(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let msg = format!("origin returned {status} for {}", origin.url);
            self.finish_inflight(&key, completion, Err(msg.clone())).await;
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(MirrorError::NotFound(msg));
            }
            return Err(MirrorError::Origin(msg));
        }

        let source: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|item| item.map_err(|e| StorageError::Io(std::io::Error::other(e)))),
        );

        metrics::MIRROR_UPLOADS_ACTIVE.inc();
        let (client_stream, upload_handle) =
            tee_to_storage(self.storage.clone(), key.clone(), source);

        let catalog = self.catalog.clone();
        let metrics_store = self.metrics.clone();
        let inflight = self.inflight.clone();
        let bucket = self.bucket_label.clone();
        let mod_id_owned = mod_id.to_string();
        let file_id_owned = file_id.to_string();
        let filename = origin.file.clone();
        let remote_id = origin.remote_id.clone();
        let task_key = key.clone();

        tokio::spawn(async move {
            let outcome = upload_handle.wait().await;
            metrics::MIRROR_UPLOADS_ACTIVE.dec();

            let result = match outcome {
                Ok(outcome) => {
                    let now = OffsetDateTime::now_utc();
                    let row = MirroredFileRow {
                        id: Uuid::new_v4(),
                        mod_id: mod_id_owned.clone(),
                        mod_download_id: file_id_owned.clone(),
                        remote_id,
                        filename,
                        s3_key: task_key.clone(),
                        s3_bucket: bucket,
                        file_hash: outcome.sha256_hex,
                        file_size: outcome.bytes_written as i64,
                        mirrored_at: now,
                        last_downloaded_at: now,
                        last_validated: None,
                        is_stale: false,
                    };

                    match catalog.upsert_mirrored_file(&row).await {
                        Ok(()) => {
                            // The upsert keeps the original id when it revives
                            // a stale row, so resolve the stored id before
                            // counting the download.
                            match catalog
                                .find_by_mod_and_file(&mod_id_owned, &file_id_owned)
                                .await
                            {
                                Ok(Some(stored)) => {
                                    metrics_store.record_download(stored.id).await
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    tracing::warn!(error = %e, "failed to resolve mirrored row id")
                                }
                            }
                            tracing::info!(
                                mod_id = %mod_id_owned,
                                file_id = %file_id_owned,
                                key = %task_key,
                                size = row.file_size,
                                "mirror complete"
                            );
                            Ok(())
                        }
                        Err(e) => {
                            tracing::error!(
                                mod_id = %mod_id_owned,
                                file_id = %file_id_owned,
                                key = %task_key,
                                error = %e,
                                "mirror upload succeeded but catalog write failed"
                            );
                            Err(e.to_string())
                        }
                    }
                }
                Err(e) => {
                    metrics::MIRROR_UPLOAD_FAILURES.inc();
                    tracing::warn!(
                        mod_id = %mod_id_owned,
                        file_id = %file_id_owned,
                        key = %task_key,
                        error = %e,
                        "mirror upload failed, will retry on next miss"
                    );
                    Err(e.to_string())
                }
            };

            if let Some(tx) = completion {
                inflight.lock().await.remove(&task_key);
                let _ = tx.send(Some(result));
            }
        });

        Ok(MirroredDownload {
            stream: client_stream,
            size: origin.size as u64,
            filename: origin.file,
        })
    }

    /// Claim or join the in-flight mirror for a storage key.
    async fn register_inflight(&self, key: &str) -> InflightSlot {
        let mut map = self.inflight.lock().await;
        if let Some(rx) = map.get(key) {
            return InflightSlot::Joined(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        map.insert(key.to_string(), rx);
        InflightSlot::Started(tx)
    }

    /// Publish a pre-tee failure and release the in-flight slot.
    async fn finish_inflight(
        &self,
        key: &str,
        completion: Option<watch::Sender<InflightState>>,
        result: Result<(), String>,
    ) {
        if let Some(tx) = completion {
            self.inflight.lock().await.remove(key);
            let _ = tx.send(Some(result));
        }
    }
}

/// Wait for an in-flight mirror to publish its result.
async fn await_inflight(mut rx: watch::Receiver<InflightState>) -> Result<(), String> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            return Err("mirror task exited without publishing a result".to_string());
        }
    }
}

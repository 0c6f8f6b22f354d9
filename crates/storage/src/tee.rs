//! Tee a byte stream to a client and to blob storage at the same time.
//!
//! The miss path serves an origin download to the requesting client while a
//! copy is uploaded to storage. The two branches are deliberately asymmetric:
//!
//! * The client branch is fed through an unbounded channel, so a slow or
//!   failing upload never stalls the client response. The flip side: when the
//!   upload outruns a slow client, that channel buffers the gap in memory, up
//!   to the full object size for a stalled client that keeps the stream open.
//! * The upload branch is fed through a bounded channel; when the uploader
//!   falls behind, the driver stops pulling from the source. Origin reads are
//!   paced by upload progress, never by the client, which also means a slow
//!   store caps how fast the client can be fed.
//!
//! Upload failures are invisible on the client branch. The caller observes
//! them only through the returned [`UploadHandle`].

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use bytes::Bytes;
use depot_core::hash::StreamingHasher;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Chunks buffered between the source driver and the upload task.
const UPLOAD_QUEUE_DEPTH: usize = 10;

/// Result of a completed tee upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub sha256_hex: String,
    /// Total bytes written to storage.
    pub bytes_written: u64,
}

/// Handle resolving when the storage branch of a tee finishes.
pub struct UploadHandle {
    rx: oneshot::Receiver<StorageResult<UploadOutcome>>,
}

impl UploadHandle {
    /// Wait for the upload to complete or fail.
    pub async fn wait(self) -> StorageResult<UploadOutcome> {
        self.rx
            .await
            .map_err(|_| StorageError::Upload("upload task exited unexpectedly".to_string()))?
    }
}

/// Split `source` into a client stream and a background upload to `key`.
///
/// The returned stream yields exactly the source's chunks in order. If the
/// source fails, the error is surfaced on the client stream and the upload is
/// aborted. Dropping the client stream does not cancel the upload.
pub fn tee_to_storage(
    store: Arc<dyn ObjectStore>,
    key: String,
    source: ByteStream,
) -> (ByteStream, UploadHandle) {
    let (client_tx, client_rx) = mpsc::unbounded_channel::<StorageResult<Bytes>>();
    let (upload_tx, upload_rx) = mpsc::channel::<Bytes>(UPLOAD_QUEUE_DEPTH);
    let (done_tx, done_rx) = oneshot::channel();

    let source_failed = Arc::new(AtomicBool::new(false));

    tokio::spawn(run_upload(
        store,
        key,
        upload_rx,
        source_failed.clone(),
        done_tx,
    ));
    tokio::spawn(drive_source(source, client_tx, upload_tx, source_failed));

    (
        Box::pin(UnboundedReceiverStream::new(client_rx)),
        UploadHandle { rx: done_rx },
    )
}

/// Pull the source and fan chunks out to both branches.
async fn drive_source(
    mut source: ByteStream,
    client_tx: mpsc::UnboundedSender<StorageResult<Bytes>>,
    upload_tx: mpsc::Sender<Bytes>,
    source_failed: Arc<AtomicBool>,
) {
    // Becomes None once the uploader has gone away; the client branch keeps
    // being served either way.
    let mut upload_tx = Some(upload_tx);

    while let Some(item) = source.next().await {
        match item {
            Ok(chunk) => {
                // Send errors mean the client went away. Keep draining so the
                // upload still completes.
                let _ = client_tx.send(Ok(chunk.clone()));

                if let Some(tx) = &upload_tx {
                    if tx.send(chunk).await.is_err() {
                        upload_tx = None;
                    }
                }
            }
            Err(e) => {
                source_failed.store(true, Ordering::SeqCst);
                let _ = client_tx.send(Err(e));
                break;
            }
        }
    }
    // Dropping upload_tx closes the channel; the uploader finishes or aborts
    // depending on the source_failed flag.
}

/// Consume the upload branch, writing and hashing chunks as they arrive.
async fn run_upload(
    store: Arc<dyn ObjectStore>,
    key: String,
    mut upload_rx: mpsc::Receiver<Bytes>,
    source_failed: Arc<AtomicBool>,
    done_tx: oneshot::Sender<StorageResult<UploadOutcome>>,
) {
    let result = async {
        let mut upload = store.put_stream(&key).await?;
        let mut hasher = StreamingHasher::new();
        let mut bytes_written = 0u64;

        while let Some(chunk) = upload_rx.recv().await {
            hasher.update(&chunk);
            bytes_written += chunk.len() as u64;
            if let Err(e) = upload.write(chunk).await {
                let _ = upload.abort().await;
                return Err(e);
            }
        }

        if source_failed.load(Ordering::SeqCst) {
            let _ = upload.abort().await;
            return Err(StorageError::Upload(
                "source stream failed, upload aborted".to_string(),
            ));
        }

        upload.finish().await?;
        Ok(UploadOutcome {
            sha256_hex: hasher.finalize_hex(),
            bytes_written,
        })
    }
    .await;

    // The caller may have dropped the handle; that is fine.
    let _ = done_tx.send(result);
}

//! Background workers and their scheduler.

pub mod cleanup;
pub mod validation;

pub use cleanup::CleanupWorker;
pub use validation::ValidationWorker;

use crate::metrics::{WORKER_RUNS, WORKER_RUN_DURATION};
use depot_catalog::CatalogError;
use depot_storage::{ObjectStore, StorageError};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Errors surfaced while processing a single worker item.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Delete a blob, treating an already-missing object as success.
///
/// Workers reconcile catalog state with storage; a blob that is already gone
/// is the desired end state, not an error.
pub(crate) async fn delete_blob_tolerant(
    storage: &dyn ObjectStore,
    key: &str,
) -> Result<(), StorageError> {
    match storage.delete(key).await {
        Ok(()) => Ok(()),
        Err(StorageError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// A periodic job definition.
pub struct JobSpec {
    pub name: &'static str,
    pub interval: Duration,
    pub enabled: bool,
}

/// Runs periodic jobs until shutdown.
///
/// Each job gets its own task; a pass that overruns its interval delays the
/// next tick instead of stacking runs.
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Register a periodic job. Disabled jobs are logged and skipped.
    ///
    /// The first run happens one full interval after startup.
    pub fn define_job<F, Fut>(&mut self, spec: JobSpec, processor: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !spec.enabled {
            tracing::info!(job = spec.name, "job disabled, not scheduling");
            return;
        }

        tracing::info!(
            job = spec.name,
            interval_secs = spec.interval.as_secs(),
            "job scheduled"
        );

        let token = self.token.child_token();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(spec.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so runs start one
            // interval from now.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!(job = spec.name, "job stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        WORKER_RUNS.with_label_values(&[spec.name]).inc();
                        let timer = WORKER_RUN_DURATION
                            .with_label_values(&[spec.name])
                            .start_timer();
                        processor().await;
                        timer.observe_duration();
                    }
                }
            }
        });
        self.handles.push((spec.name, handle));
    }

    /// Cancel all jobs and wait for in-progress passes to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for (name, handle) in self.handles {
            if handle.await.is_err() {
                tracing::error!(job = name, "job task panicked");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

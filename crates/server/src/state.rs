//! Application state shared across handlers.

use crate::metrics_store::MetricsStore;
use crate::mirror::MirrorService;
use anyhow::Context;
use depot_catalog::CatalogStore;
use depot_core::config::AppConfig;
use depot_storage::ObjectStore;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub metrics: Arc<MetricsStore>,
    pub mirror: Arc<MirrorService>,
    pub started_at: Instant,
}

impl AppState {
    /// Assemble the application state from its components.
    ///
    /// Validates the configuration and wires the mirror service to the
    /// given storage and catalog.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let metrics = Arc::new(MetricsStore::new(catalog.clone()));
        let mirror = Arc::new(
            MirrorService::new(
                storage.clone(),
                catalog.clone(),
                metrics.clone(),
                &config.origin,
                config.storage.bucket_label(),
            )
            .context("failed to construct mirror service")?,
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            catalog,
            metrics,
            mirror,
            started_at: Instant::now(),
        })
    }
}

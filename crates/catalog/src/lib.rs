//! Catalog database for the Depot mirror.
//!
//! This crate provides the control-plane data model:
//! - Mirrored file records tied to blob storage keys
//! - Origin download records (where files can be fetched from)
//! - Persistent metric counters and per-file download counts

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use postgres::PostgresCatalog;
pub use repos::{CounterRepo, MirroredFileRepo, OriginDownloadRepo};
pub use store::{CatalogStore, SqliteCatalog};

use depot_core::config::CatalogConfig;
use std::sync::Arc;

/// Create a catalog store from configuration.
pub async fn from_config(config: &CatalogConfig) -> CatalogResult<Arc<dyn CatalogStore>> {
    match config {
        CatalogConfig::Sqlite { path } => {
            let store = SqliteCatalog::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn CatalogStore>)
        }
        CatalogConfig::Postgres {
            url,
            max_connections,
        } => {
            tracing::info!("Connecting to PostgreSQL catalog");
            let store = PostgresCatalog::from_url(url, *max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn CatalogStore>)
        }
    }
}

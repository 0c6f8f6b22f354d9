//! In-process test server backed by filesystem storage and SQLite.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use bytes::Bytes;
use depot_core::config::{AppConfig, CatalogConfig, StorageConfig};
use depot_server::{create_router, AppState};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    _temp: TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        depot_server::metrics::register_metrics();

        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: temp.path().join("storage"),
        };
        config.catalog = CatalogConfig::Sqlite {
            path: temp.path().join("depot.db"),
        };

        let storage = depot_storage::from_config(&config.storage)
            .await
            .expect("storage backend");
        let catalog = depot_catalog::from_config(&config.catalog)
            .await
            .expect("catalog");
        let state = AppState::new(config, storage, catalog).expect("app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp: temp,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response")
    }

    /// GET `uri` and collect the full body.
    pub async fn get_bytes(&self, uri: &str) -> (StatusCode, Bytes) {
        let response = self.get(uri).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, body)
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.get_bytes(uri).await;
        let json = serde_json::from_slice(&body).expect("json body");
        (status, json)
    }
}

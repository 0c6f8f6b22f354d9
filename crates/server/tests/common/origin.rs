//! A tiny origin HTTP server for mirror tests.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct OriginState {
    files: Arc<HashMap<String, Bytes>>,
    hits: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

async fn serve(State(state): State<OriginState>, uri: Uri) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    match state.files.get(uri.path()) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Origin server bound to an ephemeral localhost port.
pub struct TestOrigin {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestOrigin {
    pub async fn spawn(files: Vec<(&str, Bytes)>) -> Self {
        Self::spawn_with_delay(files, None).await
    }

    /// Spawn an origin that sleeps before each response, useful for pinning
    /// down concurrent-request behavior.
    pub async fn spawn_with_delay(files: Vec<(&str, Bytes)>, delay: Option<Duration>) -> Self {
        let files: HashMap<String, Bytes> = files
            .into_iter()
            .map(|(path, bytes)| (path.to_string(), bytes))
            .collect();
        let hits = Arc::new(AtomicUsize::new(0));
        let state = OriginState {
            files: Arc::new(files),
            hits: hits.clone(),
            delay,
        };

        let app = Router::new().fallback(serve).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind origin");
        let addr = listener.local_addr().expect("origin addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

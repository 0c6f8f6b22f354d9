//! Depot server: HTTP surface, mirror orchestration, and background workers.

pub mod env;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod metrics_store;
pub mod mirror;
pub mod routes;
pub mod state;
pub mod workers;

pub use routes::create_router;
pub use state::AppState;

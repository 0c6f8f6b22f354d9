//! HTTP request handlers.

pub mod download;
pub mod health;
pub mod metrics;

pub use download::download_file;
pub use health::{health_check, service_info};
pub use metrics::get_metrics;

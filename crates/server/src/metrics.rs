//! Prometheus metrics for the Depot server.
//!
//! These are process-local operational metrics; the business metrics served
//! by the JSON `/metrics` endpoint come from the catalog database instead.
//!
//! The `/metrics/prometheus` endpoint is unauthenticated to allow scraping
//! and should be network-restricted at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_cache_hits_total",
        "Downloads served directly from blob storage",
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_cache_misses_total",
        "Downloads that required an origin fetch",
    )
    .expect("metric creation failed")
});

pub static MIRROR_UPLOADS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "depot_mirror_uploads_active",
        "Background mirror uploads currently in flight",
    )
    .expect("metric creation failed")
});

pub static MIRROR_UPLOAD_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_mirror_upload_failures_total",
        "Background mirror uploads that failed",
    )
    .expect("metric creation failed")
});

pub static DOWNLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_download_duration_seconds",
            "Time to first byte for download requests",
        )
        .buckets(vec![0.005, 0.025, 0.1, 0.25, 1.0, 5.0, 15.0, 60.0]),
    )
    .expect("metric creation failed")
});

pub static WORKER_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_worker_runs_total", "Worker passes by job name"),
        &["job"],
    )
    .expect("metric creation failed")
});

pub static WORKER_RUN_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "depot_worker_run_duration_seconds",
            "Duration of worker passes by job name",
        )
        .buckets(vec![0.1, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["job"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MIRROR_UPLOADS_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MIRROR_UPLOAD_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(WORKER_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(WORKER_RUN_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for the Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_panicking() {
        register_metrics();
        register_metrics();
    }
}

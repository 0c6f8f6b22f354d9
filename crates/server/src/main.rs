use anyhow::Context;
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::workers::{CleanupWorker, JobSpec, Scheduler, ValidationWorker};
use depot_server::{create_router, AppState};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "depotd", about = "Pull-through mirror cache for mod downloads")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, env = "DEPOT_CONFIG", default_value = "config/server.toml")]
    config: PathBuf,
}

fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }
    let mut config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    depot_server::env::apply_flat_env_overrides(&mut config, |key| std::env::var(key).ok())
        .map_err(|e| anyhow::anyhow!("invalid environment override: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Depot v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    depot_server::metrics::register_metrics();

    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage backend")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "storage ready");

    let catalog = depot_catalog::from_config(&config.catalog)
        .await
        .context("failed to initialize catalog")?;
    catalog
        .health_check()
        .await
        .context("catalog health check failed")?;
    tracing::info!("catalog ready");

    let workers = config.workers.clone();
    let bind = config.server.bind.clone();
    let state = AppState::new(config, storage.clone(), catalog.clone())?;

    let mut scheduler = Scheduler::new();
    {
        let worker = Arc::new(ValidationWorker::new(
            storage.clone(),
            catalog.clone(),
            workers.concurrency,
        ));
        scheduler.define_job(
            JobSpec {
                name: "validation",
                interval: workers.validation_interval(),
                enabled: workers.validation_enabled,
            },
            move || {
                let worker = worker.clone();
                async move {
                    worker.run().await;
                }
            },
        );
    }
    {
        let worker = Arc::new(CleanupWorker::new(
            storage,
            catalog,
            workers.cleanup_retention(),
            workers.concurrency,
        ));
        scheduler.define_job(
            JobSpec {
                name: "cleanup",
                interval: workers.cleanup_interval(),
                enabled: workers.cleanup_enabled,
            },
            move || {
                let worker = worker.clone();
                async move {
                    worker.run().await;
                }
            },
        );
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(%bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    scheduler.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

use anyhow::{Context, Result};
use catalog_service::api::{start_api_server, AppState};
use catalog_service::config::{Config, ServiceConfig};
use catalog_service::image_store::DiskImageStore;
use catalog_service::rating::RatingAggregator;
use catalog_service::service::CatalogService;
use catalog_service::store::RecordStore;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting catalog service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Shared state, one instance for the process lifetime
    let store = Arc::new(RecordStore::new());
    let ratings = Arc::new(RatingAggregator::new());
    let images = Arc::new(DiskImageStore::new(&config.images.dir));
    let service = Arc::new(
        CatalogService::new(store, ratings, images)
            .with_max_image_bytes(config.images.max_image_bytes),
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        service,
        shutdown: shutdown.clone(),
        streams: config.streams.clone(),
    };

    // Serve until a signal arrives; cancelling the token ends in-flight scans.
    let shutdown_fut = async move {
        shutdown_signal().await;
        info!("Shutting down catalog service");
        shutdown.cancel();
    };
    start_api_server(state, &config.server, shutdown_fut).await?;

    info!("Catalog service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

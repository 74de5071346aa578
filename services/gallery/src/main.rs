use anyhow::{Context, Result};
use pika_gallery::albums::AlbumRepository;
use pika_gallery::catalog::ImageRepository;
use pika_gallery::{
    start_api_server, AppState, CatalogStore, Config, DashboardService, Exporter, HttpCheckout,
    HttpIdentity, HttpImageFetcher, S3ObjectStore, Uploader,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Pika Gallery Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let catalog = Arc::new(
        CatalogStore::new(&config.database)
            .await
            .context("Failed to initialize catalog store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        catalog
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let objects = Arc::new(S3ObjectStore::new(&config.storage).await);
    let identity = Arc::new(HttpIdentity::new(&config.auth).context("Failed to initialize identity provider")?);
    let payments = Arc::new(HttpCheckout::new(&config.payment).context("Failed to initialize checkout provider")?);
    let fetcher = Arc::new(
        HttpImageFetcher::new(config.export_fetch_timeout()).context("Failed to initialize export fetcher")?,
    );

    let images: Arc<dyn ImageRepository> = catalog.clone();
    let albums: Arc<dyn AlbumRepository> = catalog.clone();

    let uploader = Arc::new(Uploader::new(
        objects,
        images.clone(),
        config.storage.upload_policy,
        config.storage.upload_concurrency,
    ));
    let exporter = Arc::new(Exporter::new(fetcher, config.export.max_items));
    let dashboard = Arc::new(DashboardService::new(images.clone(), albums.clone()));

    // Create API state
    let api_state = AppState {
        images,
        albums,
        identity,
        payments,
        uploader,
        exporter,
        dashboard,
        pool: catalog.pool().clone(),
    };

    info!(
        upload_policy = ?config.storage.upload_policy,
        upload_concurrency = config.storage.upload_concurrency,
        export_max_items = config.export.max_items,
        "Gallery service started successfully"
    );

    // Serve until a shutdown signal arrives
    if let Err(e) = start_api_server(api_state, &config.api, shutdown_signal()).await {
        error!(error = %e, "API server error");
        return Err(e);
    }

    info!("Gallery service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
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
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

    info!("Shutting down gallery service");
}

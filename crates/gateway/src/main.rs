//! DeepSearch API Gateway
//!
//! Process entry point: loads configuration, connects collaborators and
//! serves the HTTP API until a shutdown signal arrives.

use anyhow::Context;
use deepsearch_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, DocumentRepository, MemoryRepository, Repository, UserRepository},
    metrics,
    storage::create_object_store,
};
use deepsearch_gateway::{create_router, AppState};
use deepsearch_ingestion::create_extractor;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting DeepSearch API Gateway v{}",
        deepsearch_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::register_metrics();
        info!(%addr, "Prometheus exporter listening");
    }

    // Initialize persistence
    let (users, documents): (Arc<dyn UserRepository>, Arc<dyn DocumentRepository>) =
        if config.database.url == "memory" {
            warn!("Using in-memory repository; data is lost on restart");
            let repo = Arc::new(MemoryRepository::new());
            (repo.clone(), repo)
        } else {
            info!("Connecting to database...");
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.migrate().await?;
            }
            let repo = Arc::new(Repository::new(pool));
            (repo.clone(), repo)
        };

    // External collaborators
    let store = create_object_store(&config.storage).await?;
    info!(provider = store.provider(), bucket = %config.storage.bucket, "Object storage ready");

    let extractor = create_extractor(&config.extraction)?;
    if !config.extraction_enabled() {
        warn!("Entity extraction disabled: no API key configured");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let grace = config.shutdown_timeout();

    // Create app state
    let state = AppState::new(config, users, documents, store, extractor)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                error!("Graceful shutdown timed out, exiting");
                std::process::exit(1);
            });
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

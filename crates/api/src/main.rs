//! Beacon API server binary entrypoint.
//!
//! Serves the HTTP surface and, unless `WORKER_ENABLED=false`, runs the
//! notification worker pool in the same process.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use beacon_common::config::AppConfig;
use beacon_common::db::{create_pool, run_migrations};
use beacon_notifier::{
    Dispatcher, NotificationMetrics, NotificationRepository, PgNotificationRepository, Renderer,
    WorkerConfig, WorkerPool,
};

use beacon_api::routes::create_router;
use beacon_api::state::{AppState, senders_from_config};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("beacon_api=info,beacon_notifier=info,tower_http=info")
        }))
        .init();

    tracing::info!("Starting Beacon API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let repo: Arc<dyn NotificationRepository> = Arc::new(PgNotificationRepository::new(pool));

    // Delivery pipeline
    let senders = senders_from_config(&config)?;
    let dispatcher = Arc::new(Dispatcher::new(repo.clone(), senders));
    tracing::info!(channel_types = ?dispatcher.channel_types(), "Senders configured");

    let renderer = Arc::new(Renderer::new()?);
    let metrics = Arc::new(NotificationMetrics::new()?);

    let mut workers = WorkerPool::new(
        WorkerConfig::from(&config),
        repo.clone(),
        renderer,
        dispatcher.clone(),
        metrics.clone(),
    );
    if config.worker_enabled {
        workers.start().await?;
    } else {
        tracing::info!("Worker pool disabled, serving HTTP only");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));

    // Build application state
    let state = AppState::new(repo, dispatcher, metrics, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight deliveries finish before exiting.
    workers.stop().await;

    tracing::info!("Beacon API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Gateway Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request-path errors are
//! `gateway::GatewayError` rendered through `kernel::error::AppError`.

mod collaborators;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use gateway::{CleanupTask, CleanupWorker, PgGatewayRepository, gateway_router};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::collaborators::{AppIdentityResolver, AppMailer};
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_server=info,gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let repo = PgGatewayRepository::new(pool.clone());
    let gateway_config = config.gateway.clone();

    // Startup cleanup: errors here should not prevent server startup
    let cleanup = CleanupTask::new(Arc::new(repo.clone()), Arc::new(gateway_config.clone()));
    if let Err(e) = cleanup.run_once(chrono::Utc::now().timestamp_millis()).await {
        tracing::warn!(error = %e, "Startup cleanup failed, continuing anyway");
    }
    let worker = CleanupWorker::start(cleanup, gateway_config.cleanup_interval);

    let mailer = AppMailer::from_settings(&config.mail, &gateway_config)?;
    let resolver = AppIdentityResolver::from_settings(
        &gateway_config.pds_url,
        config.pds_admin_password.as_deref(),
    )?;

    // Build router
    let app = gateway_router(repo, mailer, resolver, gateway_config).layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Listening on {}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    worker.stop().await;
    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

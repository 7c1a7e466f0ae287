//! Dashboard Cache - diagnostics server
//!
//! Runs the cache layer with its background tasks and exposes health, stats
//! and invalidation over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashboard_cache::api::create_router;
use dashboard_cache::{spawn_cleanup_task, start_monitors, AppState, Config};

/// Main entry point for the dashboard cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the remote client and connect (failure is not fatal)
/// 4. Start health check, metrics and local cleanup tasks
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM: stop accepting requests, drain and close the client
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dashboard Cache");

    let config = Config::from_env();
    info!(
        remote_configured = config.connection.is_some(),
        local_ttl_ms = config.local_ttl_ms,
        cleanup_interval = config.cleanup_interval,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let client = state.cache.client().clone();

    if client.is_configured() {
        if let Err(err) = client.connect().await {
            warn!(error = %err, "Initial remote cache connection failed, continuing degraded");
        }
        start_monitors(&client);
    }

    let cleanup_handle = spawn_cleanup_task(state.local.clone(), config.cleanup_interval);
    info!("Background cleanup task started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup_handle.abort();
    state.cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

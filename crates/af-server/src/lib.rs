//! af-server: HTTP front end for the audioforge conversion engine.
//!
//! This crate wires the engine into a running server. It provides:
//!
//! - Multipart upload and remote-URL conversion endpoints
//! - Live job and health reporting
//! - Download serving for produced audio files
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use af_core::config::Config;
use af_engine::ConversionService;

use crate::context::AppContext;

/// Start the audioforge server.
///
/// Discovers tools, builds the conversion service and serves HTTP until a
/// shutdown signal arrives. In-flight requests and detached jobs are
/// allowed to finish, jobs for at most one job timeout.
pub async fn start(config: Config) -> af_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = Arc::new(af_av::ToolRegistry::discover(&config.tools));
    let probe = tools.clone();
    let infos = tokio::task::spawn_blocking(move || probe.check_all())
        .await
        .unwrap_or_default();
    for info in infos {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let conversions = ConversionService::from_tools(&config, &tools)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| af_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let drain_within = config.conversion.job_timeout();
    let ctx = AppContext::new(config, tools, conversions.clone());
    let app = router::build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| af_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Jobs whose clients went away are still running; let them finish.
    let pending = conversions.active_jobs().len();
    if pending > 0 {
        tracing::info!(pending, "Waiting for in-flight jobs");
        if !conversions.drain(drain_within).await {
            tracing::warn!("Jobs still running after {drain_within:?}; abandoning them");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

// src/server/mod.rs
// =============================================================================
// The HTTP surface: POST /crawl and GET /logs, plus job inspection.
//
// Layers, outermost first:
// - CORS: any origin, so a browser dashboard on another port can poll /logs
// - TraceLayer: one tracing span per request (target "tower_http")
// =============================================================================

mod error;
mod handlers;
mod routes;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::context::AppContext;

pub fn router(ctx: AppContext) -> Router {
    routes::create_routes(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// Binds `addr` and serves until `shutdown` resolves. In-flight requests are
// allowed to finish; the crawl workers are stopped afterwards.
pub async fn serve<F>(ctx: AppContext, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        workers = ctx.config.workers,
        politeness_ms = ctx.config.politeness_interval.as_millis() as u64,
        "Listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    info!(active_jobs = ctx.controller.active_jobs(), "Stopping crawl workers");
    ctx.shutdown().await;
    Ok(())
}

// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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

    info!("Received shutdown signal");
}

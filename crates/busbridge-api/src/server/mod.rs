//! HTTP server exposing bus objects.

pub mod router;
pub mod types;

pub use router::create_router_with_state;
pub use types::{ServerState, MAX_REQUEST_BODY_SIZE};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use busbridge_drivers::Bridge;

/// Serve the API on `bind` until Ctrl-C, then shut the bridge down.
pub async fn run(bridge: Arc<Bridge>, bind: SocketAddr) -> anyhow::Result<()> {
    let router = create_router_with_state(ServerState::new(bridge.clone()));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    tracing::info!(category = "server", address = %bind, "API server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    bridge.shutdown().await;
    tracing::info!(category = "server", "API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

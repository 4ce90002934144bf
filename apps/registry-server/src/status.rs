//! Status listener: liveness/readiness probes and the metrics endpoint.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct StatusState {
    metrics: Registry,
}

/// Serve `/healthz`, `/readyz` and `/metrics` until `cancel` fires.
///
/// # Errors
/// Fails when the listener cannot bind.
pub async fn serve(
    address: SocketAddr,
    metrics: Registry,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(StatusState { metrics });

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(%address, "status listener started");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<StatusState>) -> Result<String, StatusCode> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&state.metrics.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

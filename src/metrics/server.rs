//! Prometheus scrape endpoint
//!
//! `GET /metrics` returns the text exposition of every registered metric,
//! `GET /health` answers 200 while the process is up.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::error::{Error, Result};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Routes served on the metrics address
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    match super::encode_metrics() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, CONTENT_TYPE)],
                format!("failed to encode metrics: {e}"),
            )
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Bind `addr`; the returned listener is handed to [`serve`]
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::with_source(format!("failed to bind metrics address {addr}"), e))
}

/// Serve the metrics routes until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "Serving metrics");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::with_source("metrics server failed", e))?;

    tracing::info!("Metrics server stopped");
    Ok(())
}

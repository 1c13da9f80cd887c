//! HTTP server exposing the Prometheus /metrics endpoint.

use super::Metrics;
use crate::config::TelemetryConfig;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::Encoder as _;
use tokio::sync::watch;

use std::net::SocketAddr;

const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:9090";

/// Spawn the metrics HTTP server as a background tokio task.
///
/// Returns the `JoinHandle` so the caller can hold it for lifetime management.
/// The server shuts down when `shutdown_rx` signals true. Only called when
/// `config.metrics_enabled` is set.
pub async fn start_metrics_server(
    config: &TelemetryConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let bind_str = config.metrics_addr.as_deref().unwrap_or(DEFAULT_METRICS_ADDR);
    let bind: SocketAddr = bind_str.parse().map_err(|error| {
        anyhow::anyhow!("invalid metrics bind address '{}': {}", bind_str, error)
    })?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|error| anyhow::anyhow!("failed to bind metrics server to {}: {}", bind, error))?;

    tracing::info!(address = %bind, "metrics server started");

    let handle = tokio::spawn(async move {
        let mut shutdown_rx = shutdown_rx;
        let shutdown_signal = async move {
            let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
        };

        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!(%error, "metrics server failed");
        }
    });

    Ok(handle)
}

async fn metrics_handler() -> impl IntoResponse {
    let metrics = Metrics::global();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metrics.registry.gather(), &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(text) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                text,
            )
                .into_response(),
            Err(error) => {
                tracing::warn!(%error, "metrics encoding produced invalid UTF-8");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Err(error) => {
            tracing::warn!(%error, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

// Prometheus scrape endpoint.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::GlacierMetrics;

pub const METRICS_PATH: &str = "/metrics";
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn build_router(metrics: Arc<GlacierMetrics>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(scrape))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}

async fn scrape(State(metrics): State<Arc<GlacierMetrics>>) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics.render_prometheus())
}

/// Serve the scrape endpoint on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    metrics: Arc<GlacierMetrics>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr().context("metrics listener has no local address")?;
    info!(listen_addr = %local_addr, path = METRICS_PATH, "serving metrics");

    axum::serve(listener, build_router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server exited unexpectedly")
}

//! Observability HTTP endpoint.
//!
//! Serves `/metrics` for Prometheus scraping and `/healthz` for load
//! balancer liveness checks, on a background tokio task.

use axum::{routing::get, Router};
use std::net::SocketAddr;

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Serve the observability endpoint on `0.0.0.0:port`.
///
/// Long-running; spawn it in the background. Bind failures are logged and
/// leave the daemon running without the endpoint rather than killing it.
pub async fn run_http_server(port: u16) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(addr = %addr, "observability endpoint listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind observability endpoint");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "observability endpoint error");
    }
}

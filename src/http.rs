//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on its own tokio task and serves `/metrics` for scraping.

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the metrics HTTP server until shutdown.
pub async fn run_metrics_server(addr: SocketAddr, mut shutdown: broadcast::Receiver<()>) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    tracing::info!(address = %addr, "Metrics HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to bind metrics HTTP server");
            return;
        }
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    });

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "Metrics HTTP server error");
    }
}

//! Metrics and health endpoints served alongside the worker.

use crate::metrics::metrics_handler;

use axum::{routing::get, Router};

/// Returns a [axum::Router] serving `/metrics` and `/healthz`.
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "OK"
}

//! `GET /metrics` (§4.8): Prometheus text exposition.

use axum::{http::StatusCode, response::IntoResponse};

#[cfg(feature = "prometheus")]
pub async fn metrics_handler() -> impl IntoResponse {
    match crate::observability::metrics::get_prometheus_handle() {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics exporter not installed").into_response(),
    }
}

#[cfg(not(feature = "prometheus"))]
pub async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "metrics disabled")
}

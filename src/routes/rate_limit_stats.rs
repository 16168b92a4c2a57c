//! `GET /rate-limit/stats/{identity}` (§4.4): current per-identity window
//! counters, for operator debugging.

use axum::{Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};

use crate::AppState;

pub async fn rate_limit_stats(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    match state.rate_limiter.stats(&identity) {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

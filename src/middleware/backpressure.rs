//! In-flight request backpressure (§5): once `max_in_flight` concurrent
//! requests are being served, further requests get `503` with `Retry-After`
//! instead of queuing indefinitely.

use axum::{body::Body, extract::State, http::Request, http::StatusCode, middleware::Next, response::{IntoResponse, Response}};

use crate::{error::set_rate_limit_headers, AppState};

pub async fn backpressure_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Ok(_permit) = state.in_flight.clone().try_acquire_owned() else {
        let mut response = (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({
                "error": {
                    "kind": "overloaded",
                    "message": "too many in-flight requests",
                }
            })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(http::header::RETRY_AFTER, http::HeaderValue::from_static("1"));
        // Backpressure has no rate-limit window of its own; `max_in_flight`
        // stands in for "limit" and the reset estimate matches Retry-After,
        // so operators get the same header contract on 503 as on 429.
        set_rate_limit_headers(
            &mut response,
            Some(state.config.max_in_flight as u32),
            Some(0),
            Some(1000),
        );
        return response;
    };

    next.run(request).await
}

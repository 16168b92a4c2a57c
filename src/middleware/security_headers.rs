//! Security headers middleware.
//!
//! Adds a small set of standard hardening headers to every response,
//! independent of any guardrail decision (SPEC_FULL ambient feature).

use axum::{body::Body, extract::State, http::Request, http::header::HeaderValue, middleware::Next, response::Response};

use crate::AppState;

pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.server.security_headers.clone();

    let mut response = next.run(request).await;
    if !config.enabled {
        return response;
    }

    let headers = response.headers_mut();

    if let Some(value) = try_header_value(&config.content_type_options) {
        headers.insert("x-content-type-options", value);
    }
    if let Some(value) = try_header_value(&config.frame_options) {
        headers.insert("x-frame-options", value);
    }
    if let Some(value) = try_header_value(&config.referrer_policy) {
        headers.insert("referrer-policy", value);
    }

    response
}

fn try_header_value(s: &str) -> Option<HeaderValue> {
    if s.is_empty() {
        return None;
    }
    HeaderValue::try_from(s).ok()
}

#[cfg(test)]
mod tests {
    use super::try_header_value;

    #[test]
    fn empty_value_yields_no_header() {
        assert!(try_header_value("").is_none());
    }

    #[test]
    fn valid_value_converts() {
        assert_eq!(try_header_value("nosniff").unwrap(), "nosniff");
    }
}

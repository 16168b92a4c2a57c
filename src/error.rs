//! Top-level error taxonomy (§7): the kinds the HTTP surface maps to status
//! codes. Checker errors never reach this type — they're recovered locally
//! into `CheckerResult.error` and never unwind past the pipeline.

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde::Serialize;
use serde_json::json;

use crate::{config::policy::PolicyError, ratelimit::Denial};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request envelope: {0}")]
    Validation(String),

    #[error("policy rejected: {0}")]
    Policy(#[from] PolicyError),

    #[error("rate limited")]
    RateLimited(Denial),

    #[error("blocked by {guardrail_type}")]
    Blocked {
        guardrail_type: crate::checkers::GuardrailType,
        message: String,
        results: Vec<crate::checkers::CheckerResult>,
    },

    #[error("upstream timeout")]
    UpstreamTimeout,

    #[error("upstream connection refused")]
    UpstreamRefused,

    #[error("upstream returned {status}")]
    UpstreamServerError { status: u16 },

    #[error("upstream returned {status}: {body}")]
    UpstreamClientError { status: u16, body: String },

    #[error("too many in-flight requests")]
    Overloaded,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Sets `X-RateLimit-Limit`/`X-RateLimit-Remaining`/`X-RateLimit-Reset` on a
/// response, shared by the `429` rate-limit path here and the `503`
/// backpressure path in `middleware::backpressure` (SPEC_FULL.md's
/// "Supplemental features" commits both to the same header set). A denial
/// with no `limit` (the non-counter traffic rules: geo, business hours,
/// context length, upload size) has nothing meaningful to report and is left
/// header-free.
pub(crate) fn set_rate_limit_headers(
    response: &mut Response,
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_ms: Option<u64>,
) {
    let Some(limit) = limit else { return };
    let headers = response.headers_mut();
    if let Ok(value) = http::HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = http::HeaderValue::from_str(&remaining.unwrap_or(0).to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    let reset_secs = reset_ms.unwrap_or(0).div_ceil(1000);
    if let Ok(value) = http::HeaderValue::from_str(&reset_secs.to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: ErrorDetail { kind: "validation_error", message },
                }),
            )
                .into_response(),

            ApiError::Policy(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: ErrorDetail {
                        kind: "policy_error",
                        message: err.to_string(),
                    },
                }),
            )
                .into_response(),

            ApiError::RateLimited(denial) => {
                let retry_after_ms = denial.retry_after_ms.unwrap_or(0);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": {
                            "kind": "rate_limited",
                            "reason": denial.kind,
                            "retry_after_ms": denial.retry_after_ms,
                        }
                    })),
                )
                    .into_response();
                if retry_after_ms > 0 {
                    let retry_after_secs = retry_after_ms.div_ceil(1000).to_string();
                    if let Ok(value) = http::HeaderValue::from_str(&retry_after_secs) {
                        response.headers_mut().insert(http::header::RETRY_AFTER, value);
                    }
                }
                set_rate_limit_headers(&mut response, denial.limit, denial.remaining, denial.reset_ms);
                response
            }

            ApiError::Blocked { guardrail_type, message, results } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "allowed": false,
                    "blocked_by": guardrail_type,
                    "message": message,
                    "results": results,
                })),
            )
                .into_response(),

            ApiError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorBody {
                    error: ErrorDetail {
                        kind: "upstream_timeout",
                        message: "upstream model call exceeded its deadline".to_string(),
                    },
                }),
            )
                .into_response(),

            ApiError::UpstreamRefused | ApiError::UpstreamServerError { .. } => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody {
                    error: ErrorDetail {
                        kind: "upstream_error",
                        message: self.to_string(),
                    },
                }),
            )
                .into_response(),

            ApiError::UpstreamClientError { status: _, body } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: ErrorDetail {
                        kind: "upstream_rejected",
                        message: body,
                    },
                }),
            )
                .into_response(),

            ApiError::Overloaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: ErrorDetail {
                        kind: "overloaded",
                        message: "too many in-flight requests".to_string(),
                    },
                }),
            )
                .into_response(),

            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: ErrorDetail { kind: "internal_error", message: "internal error".to_string() },
                    }),
                )
                    .into_response()
            }
        }
    }
}

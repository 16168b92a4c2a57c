//! `POST /check/request` and `POST /check/response` (§4.7): synchronous
//! pipeline-only entry points for transformer/side-car use, with no upstream
//! call.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    checkers::Side,
    error::ApiError,
    observability::metrics::record_pipeline_outcome,
    routes::types::{CheckRequestEnvelope, CheckResponseBody, CheckResponseEnvelope},
    AppState,
};

fn status_for(side: Side, allowed: bool) -> StatusCode {
    if allowed || side == Side::Post {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// `POST /check/request`: runs `side = pre` only.
pub async fn check_request(
    State(state): State<AppState>,
    Json(envelope): Json<CheckRequestEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    if envelope.prompt.is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let use_case = envelope.use_case.unwrap_or(state.config.default_use_case);
    let policy = state.policy();

    let outcome = state
        .orchestrator
        .run(state.registry.as_ref(), &policy, Side::Pre, use_case, &envelope.prompt)
        .await;

    crate::audit::log_outcome(Side::Pre, use_case, &envelope.prompt, &outcome);
    record_pipeline_outcome(Side::Pre, use_case, &outcome);

    let status = status_for(Side::Pre, outcome.allowed);
    Ok((status, Json(CheckResponseBody::from(outcome))))
}

/// `POST /check/response`: runs `side = post` only.
pub async fn check_response(
    State(state): State<AppState>,
    Json(envelope): Json<CheckResponseEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    if envelope.response.is_empty() {
        return Err(ApiError::Validation("response must not be empty".to_string()));
    }

    let use_case = envelope.use_case.unwrap_or(state.config.default_use_case);
    let policy = state.policy();

    let outcome = state
        .orchestrator
        .run(state.registry.as_ref(), &policy, Side::Post, use_case, &envelope.response)
        .await;

    crate::audit::log_outcome(Side::Post, use_case, &envelope.response, &outcome);
    record_pipeline_outcome(Side::Post, use_case, &outcome);

    let status = status_for(Side::Post, outcome.allowed);
    Ok((status, Json(CheckResponseBody::from(outcome))))
}

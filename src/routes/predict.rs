//! `POST /predict` (§4.6): the full pre-pipeline → upstream → post-pipeline
//! flow, gated by the rate limiter ahead of anything else.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    checkers::Side,
    error::ApiError,
    observability::metrics::{record_rate_limit_denial, record_request, RequestOutcome},
    ratelimit::TrafficContext,
    routes::types::{GuardrailsSummary, PredictEnvelope, PredictResponseBody},
    AppState,
};

pub async fn predict(
    State(state): State<AppState>,
    Json(envelope): Json<PredictEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    let request = &envelope.request;
    if request.prompt.is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let use_case = request.use_case.unwrap_or(state.config.default_use_case);
    let policy = state.policy();

    let identity = request.user_id.clone().unwrap_or_else(|| "anonymous".to_string());
    let traffic_ctx = TrafficContext {
        identity: &identity,
        context_tokens: request.context_length,
        upload_bytes: request.upload_bytes,
        geo: &request.geo,
    };
    let decision = state.rate_limiter.check(&traffic_ctx, &policy.rate_rules);
    if !decision.allowed {
        let denial = decision.denial.expect("denial present when not allowed");
        record_rate_limit_denial(denial.kind);
        return Err(ApiError::RateLimited(denial));
    }

    let outcome = match crate::proxy::run(&state, &policy, use_case, &request.prompt, envelope.model).await {
        Ok(outcome) => outcome,
        // Pre-filter blocks already count as `blocked` via the pre-pipeline's
        // own outcome once it runs (recorded below); anything else here is a
        // request that never got a pipeline outcome at all — the upstream
        // call failed or the backend errored — which is exactly the `error`
        // outcome §4.8 reserves for `guardrail_requests_total`.
        Err(err @ ApiError::Blocked { .. }) => return Err(err),
        Err(err) => {
            record_request(Side::Post, use_case, RequestOutcome::Error);
            return Err(err);
        }
    };

    crate::audit::log_outcome(crate::checkers::Side::Pre, use_case, &request.prompt, &outcome.pre);
    crate::audit::log_outcome(crate::checkers::Side::Post, use_case, &outcome.pre.effective_content, &outcome.post);
    crate::observability::metrics::record_pipeline_outcome(crate::checkers::Side::Pre, use_case, &outcome.pre);
    crate::observability::metrics::record_pipeline_outcome(crate::checkers::Side::Post, use_case, &outcome.post);

    let body = PredictResponseBody {
        allowed: outcome.post.allowed,
        effective_content: outcome.post.effective_content.clone(),
        blocked_by: outcome.post.blocked_by,
        budget_exceeded: outcome.pre.budget_exceeded || outcome.post.budget_exceeded,
        model: outcome.model,
        guardrails: GuardrailsSummary {
            pre: outcome.pre.results,
            post: outcome.post.results,
        },
    };

    Ok((StatusCode::OK, Json(body)))
}

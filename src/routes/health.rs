//! Liveness/readiness endpoints (§4.7).

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::{checkers::GuardrailType, AppState};

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

/// `GET /health`: liveness. `200` once every enabled checker in the current
/// policy has completed lazy init (built-in variants init eagerly, so this
/// is effectively immediate unless an `all_in_one_judge` endpoint is
/// unreachable).
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let policy = state.policy();
    let mandatory_ready = policy
        .checkers
        .iter()
        .filter(|spec| spec.enabled)
        .all(|spec| state.registry.is_available(spec.r#type, &spec.variant_id));

    let status = if mandatory_ready { "healthy" } else { "degraded" };
    let code = if mandatory_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (code, Json(HealthBody { status, version: env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Serialize)]
struct CheckerAvailability {
    r#type: GuardrailType,
    variant_id: String,
    available: bool,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    ready: bool,
    checkers: Vec<CheckerAvailability>,
}

/// `GET /status`: readiness plus a per-checker availability map, used by the
/// `guardrail_model_available` gauge's human-readable counterpart.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let policy = state.policy();
    let checkers: Vec<CheckerAvailability> = policy
        .checkers
        .iter()
        .map(|spec| {
            let available = state.registry.is_available(spec.r#type, &spec.variant_id);
            crate::observability::metrics::record_model_available(spec.r#type, &spec.variant_id, available);
            CheckerAvailability {
                r#type: spec.r#type,
                variant_id: spec.variant_id.clone(),
                available,
            }
        })
        .collect();

    let ready = checkers.iter().all(|c| c.available);
    Json(StatusBody { ready, checkers })
}

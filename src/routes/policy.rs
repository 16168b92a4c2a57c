//! `GET/PUT /policy` (§4.1): read and hot-reload the guardrail policy
//! document. A rejected update never touches the live snapshot.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{config::policy::PolicyConfig, error::ApiError, AppState};

/// `GET /policy`: the currently active policy snapshot.
pub async fn get_policy(State(state): State<AppState>) -> impl IntoResponse {
    Json((*state.policy()).clone())
}

/// `PUT /policy`: validates the submitted document against the checker
/// registry, then atomically swaps it in along with the budget manager's
/// derived snapshot. Returns `422` with the old snapshot left in place on any
/// validation failure. The `policy_compliance` blocklist phrases live in
/// `CheckerSpec.extra["phrases"]` and need no separate derivation step here:
/// the orchestrator reads them straight out of this same snapshot per
/// dispatch (see `orchestrator::select`), so there is nothing to push ahead
/// of the swap.
pub async fn put_policy(
    State(state): State<AppState>,
    Json(candidate): Json<PolicyConfig>,
) -> Result<impl IntoResponse, ApiError> {
    candidate.validate(state.registry.as_ref())?;

    let new_policy = Arc::new(candidate);
    state.budget.rebind(new_policy.clone());
    state.set_policy(new_policy.clone());

    Ok((StatusCode::OK, Json((*new_policy).clone())))
}

//! Inference proxy (§4.6): pre-pipeline → upstream model call → post-pipeline,
//! with the failure mapping of §4.6/§7. Upstream is assumed to be an
//! OpenAI-compatible-ish HTTP/JSON backend; only the JSON contract and
//! timeout behavior are relied on (§1 Non-goals).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    checkers::{GuardrailType, Side, UseCase},
    config::policy::PolicyConfig,
    error::ApiError,
    orchestrator::PipelineOutcome,
    AppState,
};

/// Upper bound on the single retry's backoff (§4.6: "retry_once_with_backoff_ms ≤ 100").
const RETRY_BACKOFF_MS: u64 = 100;

/// Total-budget fallback when `use_case` has no configured [`UseCaseProfile`].
const DEFAULT_TOTAL_BUDGET_MS: u64 = 5000;

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Result of a completed proxy flow: the post-pipeline outcome (covers both
/// "allowed" and "post-filter blocked", both surfaced as `200`) plus the pre
/// outcome's results, folded into one `guardrails` summary by the caller.
pub struct ProxyOutcome {
    pub pre: PipelineOutcome,
    pub post: PipelineOutcome,
    pub model: Option<String>,
}

/// Runs the full `/predict` flow. The pre-filter block case is returned as
/// `Err(ApiError::Blocked)` so the handler can map it to `400` without
/// touching the upstream; every other path returns `Ok` for a `200` response
/// (including a post-filter block, which carries `allowed = false` in body).
pub async fn run(
    state: &AppState,
    policy: &PolicyConfig,
    use_case: UseCase,
    prompt: &str,
    model: Option<String>,
) -> Result<ProxyOutcome, ApiError> {
    let total_budget_ms = policy
        .use_case_profile(use_case)
        .map(|p| p.total_budget_ms)
        .unwrap_or(DEFAULT_TOTAL_BUDGET_MS);
    let request_deadline = Instant::now() + Duration::from_millis(total_budget_ms);

    let pre = state
        .orchestrator
        .run(state.registry.as_ref(), policy, Side::Pre, use_case, prompt)
        .await;

    if !pre.allowed {
        return Err(ApiError::Blocked {
            guardrail_type: pre.blocked_by.unwrap_or(GuardrailType::PromptInjection),
            message: blocked_message(&pre),
            results: pre.results.clone(),
        });
    }

    let response_content = call_upstream(
        &state.http_client,
        &state.config.upstream_url,
        &pre.effective_content,
        model.as_deref(),
        request_deadline,
    )
    .await?;

    let post = state
        .orchestrator
        .run(state.registry.as_ref(), policy, Side::Post, use_case, &response_content)
        .await;

    Ok(ProxyOutcome { pre, post, model })
}

fn blocked_message(outcome: &PipelineOutcome) -> String {
    outcome
        .results
        .iter()
        .find(|r| !r.passed && r.action == crate::checkers::Action::Block)
        .map(|r| r.message.clone())
        .unwrap_or_else(|| "blocked by guardrail pipeline".to_string())
}

/// Posts `prompt` to the upstream endpoint, retrying once with a short
/// backoff on a connection-level failure, never on a 4xx/5xx response
/// (§4.6). The whole call, including the retry, is bounded by `deadline`.
async fn call_upstream(
    client: &reqwest::Client,
    url: &str,
    prompt: &str,
    model: Option<&str>,
    deadline: Instant,
) -> Result<String, ApiError> {
    let body = UpstreamRequest { prompt, model };

    match send_once(client, url, &body, deadline).await {
        Ok(content) => Ok(content),
        Err(UpstreamAttemptError::Transient) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ApiError::UpstreamTimeout);
            }
            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS).min(remaining)).await;
            match send_once(client, url, &body, deadline).await {
                Ok(content) => Ok(content),
                Err(UpstreamAttemptError::Transient) => Err(ApiError::UpstreamRefused),
                Err(UpstreamAttemptError::TimedOut) => Err(ApiError::UpstreamTimeout),
                Err(UpstreamAttemptError::Status(status)) => map_status_error(status, String::new()),
                Err(UpstreamAttemptError::ClientStatus(status, body)) => map_status_error(status, body),
                Err(UpstreamAttemptError::Body(detail)) => Err(ApiError::Internal(detail)),
            }
        }
        Err(UpstreamAttemptError::TimedOut) => Err(ApiError::UpstreamTimeout),
        Err(UpstreamAttemptError::Status(status)) => map_status_error(status, String::new()),
        Err(UpstreamAttemptError::ClientStatus(status, body)) => map_status_error(status, body),
        Err(UpstreamAttemptError::Body(detail)) => Err(ApiError::Internal(detail)),
    }
}

fn map_status_error(status: u16, body: String) -> Result<String, ApiError> {
    if (400..500).contains(&status) {
        Err(ApiError::UpstreamClientError { status, body })
    } else {
        Err(ApiError::UpstreamServerError { status })
    }
}

enum UpstreamAttemptError {
    /// Connection refused/reset/DNS failure: worth a single retry.
    Transient,
    TimedOut,
    /// Non-2xx, non-4xx status with no body worth surfacing.
    Status(u16),
    /// 4xx status; body is passed through per §4.6.
    ClientStatus(u16, String),
    /// Response body wasn't valid JSON.
    Body(String),
}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(alias = "content")]
    response: String,
}

async fn send_once(
    client: &reqwest::Client,
    url: &str,
    body: &UpstreamRequest<'_>,
    deadline: Instant,
) -> Result<String, UpstreamAttemptError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(UpstreamAttemptError::TimedOut);
    }

    let send = client.post(url).json(body).send();
    let response = match tokio::time::timeout(remaining, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) if e.is_connect() => return Err(UpstreamAttemptError::Transient),
        Ok(Err(_)) => return Err(UpstreamAttemptError::Transient),
        Err(_) => return Err(UpstreamAttemptError::TimedOut),
    };

    let status = response.status();
    if status.is_client_error() {
        let text = response.text().await.unwrap_or_default();
        return Err(UpstreamAttemptError::ClientStatus(status.as_u16(), text));
    }
    if !status.is_success() {
        return Err(UpstreamAttemptError::Status(status.as_u16()));
    }

    response
        .json::<UpstreamResponse>()
        .await
        .map(|parsed| parsed.response)
        .map_err(|e| UpstreamAttemptError::Body(e.to_string()))
}

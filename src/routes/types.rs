//! Request/response envelopes for the HTTP check/predict surface (§6).

use serde::{Deserialize, Serialize};

use crate::checkers::{CheckerResult, GuardrailType, UseCase};
use crate::orchestrator::PipelineOutcome;

fn default_geo() -> String {
    "US".to_string()
}

/// `POST /check/request` envelope, and the request-shaped prefix of
/// `POST /predict`.
#[derive(Debug, Deserialize)]
pub struct CheckRequestEnvelope {
    pub prompt: String,
    #[serde(default)]
    pub use_case: Option<UseCase>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context_length: u32,
    #[serde(default)]
    pub upload_bytes: u64,
    #[serde(default = "default_geo")]
    pub geo: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// `POST /check/response` envelope.
#[derive(Debug, Deserialize)]
pub struct CheckResponseEnvelope {
    pub response: String,
    #[serde(default)]
    pub original_prompt: Option<String>,
    #[serde(default)]
    pub use_case: Option<UseCase>,
}

/// `POST /predict` envelope: the check/request envelope plus an upstream
/// routing field.
#[derive(Debug, Deserialize)]
pub struct PredictEnvelope {
    #[serde(flatten)]
    pub request: CheckRequestEnvelope,
    #[serde(default)]
    pub model: Option<String>,
}

/// Shared response body for `/check/request` and `/check/response` (§6).
#[derive(Debug, Serialize)]
pub struct CheckResponseBody {
    pub allowed: bool,
    pub effective_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<GuardrailType>,
    pub budget_exceeded: bool,
    pub results: Vec<CheckerResult>,
}

impl From<PipelineOutcome> for CheckResponseBody {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            allowed: outcome.allowed,
            effective_content: outcome.effective_content,
            blocked_by: outcome.blocked_by,
            budget_exceeded: outcome.budget_exceeded,
            results: outcome.results,
        }
    }
}

/// `POST /predict` response body: the final (post-filter) outcome plus a
/// `guardrails` block summarizing both sides (§4.6 step 5).
#[derive(Debug, Serialize)]
pub struct PredictResponseBody {
    pub allowed: bool,
    pub effective_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<GuardrailType>,
    pub budget_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub guardrails: GuardrailsSummary,
}

#[derive(Debug, Serialize)]
pub struct GuardrailsSummary {
    pub pre: Vec<CheckerResult>,
    pub post: Vec<CheckerResult>,
}

//! Pluggable HTTP judge checker, variant id `http_v1`.
//!
//! Delegates scoring to an external HTTP endpoint (an "all-in-one" model
//! judge) and applies a single retry with exponential backoff on transient
//! failures, the same shape as the reference gateway's guardrails retry
//! helper. The deadline passed in [`CheckerParams`] always wins over the
//! retry schedule: a retry is only attempted if there is time left for it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Action, Capabilities, Checker, CheckerErrorKind, CheckerParams, CheckerResult, GuardrailType, Severity};

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("judge http client builds")
});

#[derive(Debug, Serialize)]
struct JudgeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    confidence: f64,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_action(raw: Option<&str>) -> Action {
    match raw {
        Some("block") => Action::Block,
        Some("allow_with_warning") => Action::AllowWithWarning,
        Some("redact") => Action::Redact,
        Some("modify") => Action::Modify,
        _ => Action::Block,
    }
}

fn delay_for_attempt(attempt: u32) -> Duration {
    let base_ms = 50.0_f64 * 2.0_f64.powi(attempt as i32);
    let jitter = rand::random::<f64>() * base_ms * 0.1;
    Duration::from_millis((base_ms + jitter).min(1000.0) as u64)
}

/// HTTP-backed checker that can serve any guardrail type by scoring content
/// through an external judge model. Registered per distinct endpoint URL.
pub struct HttpJudgeChecker {
    endpoint: String,
}

impl HttpJudgeChecker {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }

    async fn call_once(&self, content: &str) -> Result<JudgeResponse, String> {
        let response = HTTP_CLIENT
            .post(&self.endpoint)
            .json(&JudgeRequest { content })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("judge endpoint returned {}", response.status()));
        }

        response
            .json::<JudgeResponse>()
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Checker for HttpJudgeChecker {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            r#type: GuardrailType::AllInOneJudge,
            variant_id: "http_v1".to_string(),
            can_redact: false,
            supports_batch: false,
            expected_latency_ms: 200,
        }
    }

    async fn check(&self, content: &str, params: &CheckerParams) -> CheckerResult {
        let start = Instant::now();

        let mut attempt = 0;
        loop {
            if params.remaining().is_zero() {
                return CheckerResult::deadline_expired(
                    GuardrailType::AllInOneJudge,
                    "http_v1",
                    params.fail_closed,
                );
            }

            match self.call_once(content).await {
                Ok(response) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    let passed = response.confidence < params.threshold;
                    return if passed {
                        CheckerResult::passed(GuardrailType::AllInOneJudge, "http_v1", response.confidence)
                            .with_latency_ms(latency_ms)
                    } else {
                        CheckerResult::violation(
                            GuardrailType::AllInOneJudge,
                            "http_v1",
                            response.confidence,
                            parse_action(response.action.as_deref()),
                            response.message.unwrap_or_else(|| "judge flagged content".to_string()),
                        )
                        .with_latency_ms(latency_ms)
                        .with_severity(Severity::Error)
                    };
                }
                Err(detail) => {
                    if attempt >= 1 || params.remaining() <= delay_for_attempt(attempt) {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        let mut result = CheckerResult::passed(GuardrailType::AllInOneJudge, "http_v1", 0.0)
                            .with_latency_ms(latency_ms)
                            .with_severity(Severity::Warning)
                            .with_error(CheckerErrorKind::Unavailable, detail);
                        result.passed = !params.fail_closed;
                        return result;
                    }
                    tokio::time::sleep(delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_action_strings() {
        assert_eq!(parse_action(Some("block")), Action::Block);
        assert_eq!(parse_action(Some("allow_with_warning")), Action::AllowWithWarning);
        assert_eq!(parse_action(Some("redact")), Action::Redact);
        assert_eq!(parse_action(Some("modify")), Action::Modify);
    }

    #[test]
    fn unknown_action_string_defaults_to_block() {
        assert_eq!(parse_action(Some("something_else")), Action::Block);
        assert_eq!(parse_action(None), Action::Block);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let d0 = delay_for_attempt(0);
        let d3 = delay_for_attempt(3);
        assert!(d3 >= d0);
        assert!(d3 <= Duration::from_millis(1100));
    }
}

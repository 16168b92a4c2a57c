//! Prometheus metrics surface (§4.8/§2 component I).
//!
//! Exposes exactly the instruments named in §4.8: request outcomes, block
//! counts, per-checker latency, per-use-case latency, budget overruns,
//! confidence-score samples, checker availability, and rate-limit denials.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::{
    checkers::{GuardrailType, Side, UseCase},
    config::MetricsConfig,
    ratelimit::DenialKind,
};

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Default histogram buckets for `_duration_seconds` metrics: covers the
/// `expected_latency_ms <= 10` pattern checkers up through a slow judge call.
const LATENCY_BUCKETS_SECS: &[f64] = &[
    0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            LATENCY_BUCKETS_SECS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_seconds".to_string()),
            LATENCY_BUCKETS_SECS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("metrics already initialized".to_string()))?;

    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Outcome label for `guardrail_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Allowed,
    Blocked,
    Error,
}

impl RequestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RequestOutcome::Allowed => "allowed",
            RequestOutcome::Blocked => "blocked",
            RequestOutcome::Error => "error",
        }
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Pre => "pre",
        Side::Post => "post",
    }
}

/// `guardrail_requests_total{side, use_case, outcome}`.
#[allow(unused_variables)]
pub fn record_request(side: Side, use_case: UseCase, outcome: RequestOutcome) {
    #[cfg(feature = "prometheus")]
    counter!(
        "guardrail_requests_total",
        "side" => side_str(side),
        "use_case" => use_case.to_string(),
        "outcome" => outcome.as_str(),
    )
    .increment(1);
}

/// `guardrail_requests_blocked_total{type, variant}`.
#[allow(unused_variables)]
pub fn record_blocked(guardrail_type: GuardrailType, variant: &str) {
    #[cfg(feature = "prometheus")]
    counter!(
        "guardrail_requests_blocked_total",
        "type" => guardrail_type.to_string(),
        "variant" => variant.to_string(),
    )
    .increment(1);
}

/// `guardrail_check_duration_seconds{type, variant}`.
#[allow(unused_variables)]
pub fn record_check_duration(guardrail_type: GuardrailType, variant: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    histogram!(
        "guardrail_check_duration_seconds",
        "type" => guardrail_type.to_string(),
        "variant" => variant.to_string(),
    )
    .record(duration_secs);
}

/// `guardrail_latency_by_use_case_seconds{use_case, side}`.
#[allow(unused_variables)]
pub fn record_use_case_latency(use_case: UseCase, side: Side, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    histogram!(
        "guardrail_latency_by_use_case_seconds",
        "use_case" => use_case.to_string(),
        "side" => side_str(side),
    )
    .record(duration_secs);
}

/// `guardrail_latency_budget_exceeded_total{use_case, side}`.
#[allow(unused_variables)]
pub fn record_budget_exceeded(use_case: UseCase, side: Side) {
    #[cfg(feature = "prometheus")]
    counter!(
        "guardrail_latency_budget_exceeded_total",
        "use_case" => use_case.to_string(),
        "side" => side_str(side),
    )
    .increment(1);
}

/// `guardrail_confidence_score{type, variant}`: one sample per checker call.
#[allow(unused_variables)]
pub fn record_confidence(guardrail_type: GuardrailType, variant: &str, confidence: f64) {
    #[cfg(feature = "prometheus")]
    histogram!(
        "guardrail_confidence_score",
        "type" => guardrail_type.to_string(),
        "variant" => variant.to_string(),
    )
    .record(confidence);
}

/// `guardrail_model_available{type, variant}` gauge in `{0, 1}`.
#[allow(unused_variables)]
pub fn record_model_available(guardrail_type: GuardrailType, variant: &str, available: bool) {
    #[cfg(feature = "prometheus")]
    gauge!(
        "guardrail_model_available",
        "type" => guardrail_type.to_string(),
        "variant" => variant.to_string(),
    )
    .set(if available { 1.0 } else { 0.0 });
}

fn denial_kind_str(kind: DenialKind) -> &'static str {
    match kind {
        DenialKind::Geo => "geo",
        DenialKind::BusinessHours => "business_hours",
        DenialKind::ContextLength => "context_length",
        DenialKind::UploadSize => "upload_size",
        DenialKind::PerMinute => "per_minute",
        DenialKind::PerHour => "per_hour",
        DenialKind::PerDay => "per_day",
    }
}

/// `rate_limit_denials_total{reason}`.
#[allow(unused_variables)]
pub fn record_rate_limit_denial(kind: DenialKind) {
    #[cfg(feature = "prometheus")]
    counter!(
        "rate_limit_denials_total",
        "reason" => denial_kind_str(kind),
    )
    .increment(1);
}

/// Records every `CheckerResult` produced by one pipeline run: per-checker
/// duration, confidence sample, and a block increment when applicable.
pub fn record_pipeline_outcome(
    side: Side,
    use_case: UseCase,
    outcome: &crate::orchestrator::PipelineOutcome,
) {
    for result in &outcome.results {
        record_check_duration(result.r#type, &result.variant_id, result.latency_ms as f64 / 1000.0);
        record_confidence(result.r#type, &result.variant_id, result.confidence);
        if !result.passed && result.action == crate::checkers::Action::Block {
            record_blocked(result.r#type, &result.variant_id);
        }
    }
    if outcome.budget_exceeded {
        record_budget_exceeded(use_case, side);
    }
    let request_outcome = if outcome.allowed {
        RequestOutcome::Allowed
    } else {
        RequestOutcome::Blocked
    };
    record_request(side, use_case, request_outcome);
}

#[cfg(feature = "prometheus")]
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to configure metrics exporter: {0}")]
    Setup(String),
    #[error("failed to install prometheus recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

#[cfg(not(feature = "prometheus"))]
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics error: {0}")]
    Setup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_outcome_labels_are_stable() {
        assert_eq!(RequestOutcome::Allowed.as_str(), "allowed");
        assert_eq!(RequestOutcome::Blocked.as_str(), "blocked");
        assert_eq!(RequestOutcome::Error.as_str(), "error");
    }

    #[test]
    fn denial_kind_labels_are_stable() {
        assert_eq!(denial_kind_str(DenialKind::PerMinute), "per_minute");
        assert_eq!(denial_kind_str(DenialKind::Geo), "geo");
    }

    #[test]
    fn recording_does_not_panic_without_an_installed_recorder() {
        record_request(Side::Pre, UseCase::Chat, RequestOutcome::Allowed);
        record_blocked(GuardrailType::Secrets, "pattern_v1");
        record_confidence(GuardrailType::Pii, "pattern_v1", 0.42);
        record_model_available(GuardrailType::Toxicity, "pattern_v1", true);
        record_rate_limit_denial(DenialKind::PerHour);
    }
}

//! Core types shared by every checker and by the pipeline orchestrator.

use std::{collections::HashMap, fmt, time::Instant};

use serde::{Deserialize, Serialize};

/// The kind of guardrail a checker implements.
///
/// Stable wire identifiers: used as map keys (registry, policy overrides) and
/// as metric label values, so the `Display`/`Deserialize` forms must stay in
/// sync with the lowercase snake_case spellings below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailType {
    Toxicity,
    Pii,
    PromptInjection,
    AllInOneJudge,
    PolicyCompliance,
    Secrets,
    Traffic,
}

impl GuardrailType {
    /// Dispatch order for the pipeline orchestrator (§4.3): cheap
    /// discriminators before expensive judges, redacting checkers before
    /// scoring checkers.
    pub const PRIORITY_ORDER: [GuardrailType; 6] = [
        GuardrailType::PromptInjection,
        GuardrailType::Secrets,
        GuardrailType::Pii,
        GuardrailType::Toxicity,
        GuardrailType::AllInOneJudge,
        GuardrailType::PolicyCompliance,
    ];

    pub fn priority(self) -> usize {
        Self::PRIORITY_ORDER
            .iter()
            .position(|t| *t == self)
            .unwrap_or(Self::PRIORITY_ORDER.len())
    }

    /// Redacting checker types mutate `effective_content` and must never run
    /// concurrently with the scoring checkers that read it.
    pub fn can_redact_by_default(self) -> bool {
        matches!(self, GuardrailType::Pii | GuardrailType::Secrets)
    }
}

impl fmt::Display for GuardrailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardrailType::Toxicity => "toxicity",
            GuardrailType::Pii => "pii",
            GuardrailType::PromptInjection => "prompt_injection",
            GuardrailType::AllInOneJudge => "all_in_one_judge",
            GuardrailType::PolicyCompliance => "policy_compliance",
            GuardrailType::Secrets => "secrets",
            GuardrailType::Traffic => "traffic",
        };
        write!(f, "{s}")
    }
}

/// The orchestrator's response to a failing checker result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Block,
    AllowWithWarning,
    Allow,
    Redact,
    Modify,
}

/// Selects latency budget and preferred checker variants for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    Chat,
    Rag,
    CodeGen,
    Batch,
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UseCase::Chat => "chat",
            UseCase::Rag => "rag",
            UseCase::CodeGen => "code_gen",
            UseCase::Batch => "batch",
        };
        write!(f, "{s}")
    }
}

/// Attached to results for telemetry; never authoritative for blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Which side of the request/response the content being checked belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Pre,
    Post,
}

/// Kind of a non-fatal per-checker error, carried as data rather than
/// propagated as a request-level failure (§4.3 Failure semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerErrorKind {
    Deadline,
    Unavailable,
    Internal,
    BudgetSkipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerError {
    pub kind: CheckerErrorKind,
    pub detail: String,
}

/// Capabilities a checker variant advertises to the registry/orchestrator.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub r#type: GuardrailType,
    pub variant_id: String,
    pub can_redact: bool,
    pub supports_batch: bool,
    pub expected_latency_ms: u64,
}

/// Parameters for a single checker invocation.
#[derive(Debug, Clone)]
pub struct CheckerParams {
    pub threshold: f64,
    pub extra: HashMap<String, serde_json::Value>,
    /// Hard per-checker deadline; the checker must observe it.
    pub deadline: Instant,
    /// When true, deadline expiry and internal errors resolve `passed = false`
    /// instead of the default fail-open `passed = true`.
    pub fail_closed: bool,
}

impl CheckerParams {
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// The outcome of one checker run against one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerResult {
    pub r#type: GuardrailType,
    pub variant_id: String,
    pub passed: bool,
    pub confidence: f64,
    pub action: Action,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted: Option<String>,
    pub latency_ms: u64,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckerError>,
}

impl CheckerResult {
    pub fn passed(r#type: GuardrailType, variant_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            r#type,
            variant_id: variant_id.into(),
            passed: true,
            confidence,
            action: Action::Allow,
            message: "passed".to_string(),
            redacted: None,
            latency_ms: 0,
            severity: Severity::Info,
            error: None,
        }
    }

    pub fn violation(
        r#type: GuardrailType,
        variant_id: impl Into<String>,
        confidence: f64,
        action: Action,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type,
            variant_id: variant_id.into(),
            passed: false,
            confidence,
            action,
            message: message.into(),
            redacted: None,
            latency_ms: 0,
            severity: Severity::Warning,
            error: None,
        }
    }

    pub fn with_redacted(mut self, redacted: impl Into<String>) -> Self {
        self.redacted = Some(redacted.into());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_error(mut self, kind: CheckerErrorKind, detail: impl Into<String>) -> Self {
        self.error = Some(CheckerError {
            kind,
            detail: detail.into(),
        });
        self
    }

    /// Budget-skip result: fail-open, never an error to the caller (§7).
    pub fn budget_skipped(r#type: GuardrailType, variant_id: impl Into<String>) -> Self {
        Self::passed(r#type, variant_id, 0.0)
            .with_severity(Severity::Warning)
            .with_error(CheckerErrorKind::BudgetSkipped, "guardrail budget exhausted")
    }

    /// Deadline-expiry result. Fail-open unless the caller requested
    /// fail-closed behavior via `CheckerParams::fail_closed`.
    pub fn deadline_expired(
        r#type: GuardrailType,
        variant_id: impl Into<String>,
        fail_closed: bool,
    ) -> Self {
        let mut result = Self::passed(r#type, variant_id, 0.0).with_severity(Severity::Warning);
        result.passed = !fail_closed;
        result.with_error(CheckerErrorKind::Deadline, "checker deadline expired")
    }
}

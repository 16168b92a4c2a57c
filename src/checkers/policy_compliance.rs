//! Built-in blocklist-style policy-compliance checker, variant id `blocklist_v1`.
//!
//! Grounded on the reference gateway's `BlocklistProvider`: phrases are
//! escaped and compiled case-insensitively at construction time so matching
//! at request time is a precompiled-regex scan, not a literal-search loop.

use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;

use super::{Action, Capabilities, Checker, CheckerParams, CheckerResult, GuardrailType, Severity};

struct CompiledPhrase {
    regex: Regex,
    original: String,
}

fn compile_phrase(phrase: &str) -> Option<CompiledPhrase> {
    let escaped = regex::escape(phrase);
    Regex::new(&format!("(?i){escaped}"))
        .ok()
        .map(|regex| CompiledPhrase {
            regex,
            original: phrase.to_string(),
        })
}

/// Blocklist-based policy-compliance checker. Holds a fixed set of
/// organization-defined disallowed phrases. Built fresh per dispatch from the
/// live policy snapshot's `extra["phrases"]` (see `orchestrator::select`), so
/// a hot reload can never mix old and new phrases within one request.
pub struct PolicyComplianceChecker {
    patterns: Vec<CompiledPhrase>,
}

impl PolicyComplianceChecker {
    pub fn new(phrases: Vec<String>) -> Self {
        let patterns = phrases.iter().filter_map(|p| compile_phrase(p)).collect();
        Self { patterns }
    }

    fn matches(&self, content: &str) -> Vec<&str> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(content))
            .map(|p| p.original.as_str())
            .collect()
    }
}

#[async_trait]
impl Checker for PolicyComplianceChecker {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            r#type: GuardrailType::PolicyCompliance,
            variant_id: "blocklist_v1".to_string(),
            can_redact: false,
            supports_batch: false,
            expected_latency_ms: 5,
        }
    }

    async fn check(&self, content: &str, params: &CheckerParams) -> CheckerResult {
        if params.remaining().is_zero() {
            return CheckerResult::deadline_expired(
                GuardrailType::PolicyCompliance,
                "blocklist_v1",
                params.fail_closed,
            );
        }

        let start = Instant::now();
        let hits = self.matches(content);
        let latency_ms = start.elapsed().as_millis() as u64;

        if hits.is_empty() {
            return CheckerResult::passed(GuardrailType::PolicyCompliance, "blocklist_v1", 0.0)
                .with_latency_ms(latency_ms);
        }

        CheckerResult::violation(
            GuardrailType::PolicyCompliance,
            "blocklist_v1",
            1.0,
            Action::Block,
            format!("matched disallowed phrase(s): {}", hits.join(", ")),
        )
        .with_latency_ms(latency_ms)
        .with_severity(Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, time::Duration};

    fn params() -> CheckerParams {
        CheckerParams {
            threshold: 0.5,
            extra: HashMap::new(),
            deadline: Instant::now() + Duration::from_millis(50),
            fail_closed: false,
        }
    }

    #[tokio::test]
    async fn blocks_configured_phrase_case_insensitively() {
        let checker = PolicyComplianceChecker::new(vec!["internal roadmap".to_string()]);
        let result = checker
            .check("Here is our INTERNAL ROADMAP for next quarter.", &params())
            .await;
        assert!(!result.passed);
        assert_eq!(result.action, Action::Block);
    }

    #[tokio::test]
    async fn passes_when_no_phrase_configured() {
        let checker = PolicyComplianceChecker::new(Vec::new());
        let result = checker.check("anything at all", &params()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn passes_unrelated_content() {
        let checker = PolicyComplianceChecker::new(vec!["internal roadmap".to_string()]);
        let result = checker.check("The weather today is sunny.", &params()).await;
        assert!(result.passed);
    }
}

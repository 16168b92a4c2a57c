//! Built-in pattern-based toxicity checker, variant id `pattern_v1`.
//!
//! A lightweight lexicon-scoring scanner that keeps the toxicity slot in the
//! pipeline functional when no ML classifier is configured. Production
//! deployments are expected to register an `all_in_one_judge`/`http_v1`
//! variant for this guardrail type instead; see [`super::judge`].

use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Action, Capabilities, Checker, CheckerParams, CheckerResult, GuardrailType, Severity};

struct LexiconEntry {
    regex: Regex,
    weight: f64,
}

static LEXICON: Lazy<Vec<LexiconEntry>> = Lazy::new(|| {
    // Deliberately coarse: word-boundary matches on a small severe-abuse
    // lexicon. Tuned for low false negatives on the obvious cases; nuanced
    // toxicity (sarcasm, coded slurs) needs the judge variant.
    let specs: &[(&str, f64)] = &[
        (r"(?i)\bi\s+will\s+kill\s+you\b", 0.95),
        (r"(?i)\byou\s+(are|re)\s+worthless\b", 0.7),
        (r"(?i)\bkys\b", 0.9),
        (r"(?i)\bi\s+hate\s+(you|all)\b", 0.6),
        (r"(?i)\bgo\s+die\b", 0.85),
    ];
    specs
        .iter()
        .map(|(pattern, weight)| LexiconEntry {
            regex: Regex::new(pattern).expect("toxicity lexicon pattern compiles"),
            weight: *weight,
        })
        .collect()
});

pub struct ToxicityChecker;

impl ToxicityChecker {
    pub fn new() -> Self {
        Self
    }

    fn score(content: &str) -> f64 {
        LEXICON
            .iter()
            .filter(|entry| entry.regex.is_match(content))
            .map(|entry| entry.weight)
            .fold(0.0_f64, f64::max)
    }
}

impl Default for ToxicityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for ToxicityChecker {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            r#type: GuardrailType::Toxicity,
            variant_id: "pattern_v1".to_string(),
            can_redact: false,
            supports_batch: false,
            expected_latency_ms: 5,
        }
    }

    async fn check(&self, content: &str, params: &CheckerParams) -> CheckerResult {
        if params.remaining().is_zero() {
            return CheckerResult::deadline_expired(
                GuardrailType::Toxicity,
                "pattern_v1",
                params.fail_closed,
            );
        }

        let start = Instant::now();
        let confidence = Self::score(content);
        let passed = confidence < params.threshold;
        let latency_ms = start.elapsed().as_millis() as u64;

        if passed {
            CheckerResult::passed(GuardrailType::Toxicity, "pattern_v1", confidence)
                .with_latency_ms(latency_ms)
        } else {
            CheckerResult::violation(
                GuardrailType::Toxicity,
                "pattern_v1",
                confidence,
                Action::Block,
                "toxic language lexicon match",
            )
            .with_latency_ms(latency_ms)
            .with_severity(Severity::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, time::Duration};

    fn params(threshold: f64) -> CheckerParams {
        CheckerParams {
            threshold,
            extra: HashMap::new(),
            deadline: Instant::now() + Duration::from_millis(50),
            fail_closed: false,
        }
    }

    #[tokio::test]
    async fn passes_neutral_text() {
        let checker = ToxicityChecker::new();
        let result = checker.check("Let's schedule the meeting for Tuesday.", &params(0.75)).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn blocks_explicit_threat() {
        let checker = ToxicityChecker::new();
        let result = checker.check("I will kill you if you do that again.", &params(0.75)).await;
        assert!(!result.passed);
        assert_eq!(result.action, Action::Block);
    }
}

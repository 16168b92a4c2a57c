//! Built-in pattern-based PII checker, variant id `pattern_v1`.
//!
//! Grounded on the reference gateway's `pii_regex` provider: the same pattern
//! set (email, phone, SSN, credit card, IPv4, date-of-birth) and the same
//! Luhn/SSN structural validators, but redaction here is span-based rather
//! than whole-content replacement, per the partial-redaction example this
//! guardrail type is defined by.

use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Action, Capabilities, Checker, CheckerParams, CheckerResult, GuardrailType, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Ipv4,
    DateOfBirth,
}

impl PiiKind {
    fn label(self) -> &'static str {
        match self {
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::Ssn => "SSN",
            PiiKind::CreditCard => "CREDIT_CARD",
            PiiKind::Ipv4 => "IP_ADDRESS",
            PiiKind::DateOfBirth => "DATE_OF_BIRTH",
        }
    }
}

struct PiiPattern {
    kind: PiiKind,
    regex: Regex,
    validate: fn(&str) -> bool,
}

fn always_valid(_: &str) -> bool {
    true
}

fn validate_luhn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    let mut sum = 0;
    let mut double = false;
    for &digit in digits.iter().rev() {
        let mut value = digit;
        if double {
            value *= 2;
            if value > 9 {
                value -= 9;
            }
        }
        sum += value;
        double = !double;
    }
    sum % 10 == 0
}

fn validate_ssn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 9 {
        return false;
    }
    let area = digits[0] * 100 + digits[1] * 10 + digits[2];
    let group = digits[3] * 10 + digits[4];
    let serial = digits[5] * 1000 + digits[6] * 100 + digits[7] * 10 + digits[8];
    area != 0 && area != 666 && area < 900 && group != 0 && serial != 0
}

static PATTERNS: Lazy<Vec<PiiPattern>> = Lazy::new(|| {
    vec![
        PiiPattern {
            kind: PiiKind::Email,
            regex: Regex::new(r"(?i)\b[a-z0-9.+_-]+@[a-z0-9-]+\.[a-z0-9.-]+\b").unwrap(),
            validate: always_valid,
        },
        PiiPattern {
            kind: PiiKind::Phone,
            regex: Regex::new(r"\b(\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b").unwrap(),
            validate: always_valid,
        },
        PiiPattern {
            kind: PiiKind::Ssn,
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            validate: validate_ssn,
        },
        PiiPattern {
            kind: PiiKind::CreditCard,
            regex: Regex::new(r"\b(?:\d[ -]?){13,19}\b").unwrap(),
            validate: validate_luhn,
        },
        PiiPattern {
            kind: PiiKind::Ipv4,
            regex: Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b")
                .unwrap(),
            validate: always_valid,
        },
        PiiPattern {
            kind: PiiKind::DateOfBirth,
            regex: Regex::new(r"\b(0[1-9]|1[0-2])/(0[1-9]|[12]\d|3[01])/(19|20)\d{2}\b").unwrap(),
            validate: always_valid,
        },
    ]
});

struct Match {
    kind: PiiKind,
    start: usize,
    end: usize,
}

fn find_matches(content: &str) -> Vec<Match> {
    let mut matches = Vec::new();
    for pattern in PATTERNS.iter() {
        for m in pattern.regex.find_iter(content) {
            if (pattern.validate)(m.as_str()) {
                matches.push(Match {
                    kind: pattern.kind,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
    }
    matches.sort_by_key(|m| m.start);
    // Drop matches fully contained within an earlier, already-accepted match
    // (e.g. an IPv4-shaped run inside a longer credit-card digit run).
    let mut accepted: Vec<Match> = Vec::new();
    for m in matches {
        let overlaps = accepted
            .iter()
            .any(|a| m.start < a.end && m.end > a.start);
        if !overlaps {
            accepted.push(m);
        }
    }
    accepted
}

fn redact(content: &str, matches: &[Match]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for m in matches {
        out.push_str(&content[cursor..m.start]);
        out.push('[');
        out.push_str(m.kind.label());
        out.push_str("_REDACTED]");
        cursor = m.end;
    }
    out.push_str(&content[cursor..]);
    out
}

/// Pattern-based PII checker, variant id `pattern_v1`.
pub struct PiiChecker;

impl PiiChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PiiChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for PiiChecker {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            r#type: GuardrailType::Pii,
            variant_id: "pattern_v1".to_string(),
            can_redact: true,
            supports_batch: false,
            expected_latency_ms: 8,
        }
    }

    async fn check(&self, content: &str, params: &CheckerParams) -> CheckerResult {
        if params.remaining().is_zero() {
            return CheckerResult::deadline_expired(GuardrailType::Pii, "pattern_v1", params.fail_closed);
        }

        let start = Instant::now();
        let matches = find_matches(content);
        let latency_ms = start.elapsed().as_millis() as u64;

        if matches.is_empty() {
            return CheckerResult::passed(GuardrailType::Pii, "pattern_v1", 0.0)
                .with_latency_ms(latency_ms);
        }

        let labels: Vec<&'static str> = {
            let mut seen = Vec::new();
            for m in &matches {
                if !seen.contains(&m.kind.label()) {
                    seen.push(m.kind.label());
                }
            }
            seen
        };
        let confidence = 1.0_f64.min(0.5 + 0.1 * matches.len() as f64);
        let redacted = redact(content, &matches);

        CheckerResult::violation(
            GuardrailType::Pii,
            "pattern_v1",
            confidence,
            Action::Redact,
            format!("detected {} pii span(s): {}", matches.len(), labels.join(", ")),
        )
        .with_redacted(redacted)
        .with_latency_ms(latency_ms)
        .with_severity(Severity::Warning)
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
    async fn redacts_email_span_leaving_rest_of_sentence_intact() {
        let checker = PiiChecker::new();
        let result = checker
            .check("My email is jane.doe@example.com, call me.", &params())
            .await;
        assert!(!result.passed);
        assert_eq!(result.action, Action::Redact);
        let redacted = result.redacted.expect("redacted text present");
        assert_eq!(redacted, "My email is [EMAIL_REDACTED], call me.");
    }

    #[tokio::test]
    async fn passes_content_without_pii() {
        let checker = PiiChecker::new();
        let result = checker.check("The weather is nice today.", &params()).await;
        assert!(result.passed);
        assert!(result.redacted.is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_ssn_structure() {
        let checker = PiiChecker::new();
        // Area code 000 is never valid.
        let result = checker.check("SSN: 000-12-3456", &params()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn rejects_credit_card_failing_luhn() {
        let checker = PiiChecker::new();
        let result = checker
            .check("Card number 4111 1111 1111 1112", &params())
            .await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn accepts_credit_card_passing_luhn() {
        let checker = PiiChecker::new();
        let result = checker
            .check("Card number 4111 1111 1111 1111", &params())
            .await;
        assert!(!result.passed);
    }
}

//! Structured audit logging for block/redact decisions (§7 user-visible
//! behavior: "redaction is reported transparently").
//!
//! Emits a `tracing` event per blocking or redacting result with a SHA-256
//! hash of the content involved rather than the content itself, so logs
//! never carry the sensitive spans a checker just flagged. No persistence:
//! this is observability, not a durable audit trail (§1 Non-goals).

use sha2::{Digest, Sha256};

use crate::checkers::{Action, CheckerResult, Severity, Side};

/// SHA-256 hex digest of `content`. Lets an operator correlate "this hash
/// was redacted" across log lines without ever storing the original text.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Emits one audit event per result that blocked, redacted, modified, or
/// warned. Passing, unremarkable results are not logged here; they're
/// already covered by metrics.
pub fn log_result(side: Side, use_case: crate::checkers::UseCase, before: &str, result: &CheckerResult) {
    match result.action {
        Action::Block if !result.passed => {
            tracing::warn!(
                event = "guardrail.block",
                side = ?side,
                use_case = %use_case,
                r#type = %result.r#type,
                variant = %result.variant_id,
                confidence = result.confidence,
                content_hash = %hash_content(before),
                message = %result.message,
                "guardrail blocked content"
            );
        }
        Action::Redact | Action::Modify => {
            let after_hash = result.redacted.as_deref().map(hash_content);
            tracing::info!(
                event = "guardrail.redact",
                side = ?side,
                use_case = %use_case,
                r#type = %result.r#type,
                variant = %result.variant_id,
                before_hash = %hash_content(before),
                after_hash = after_hash.as_deref().unwrap_or(""),
                message = %result.message,
                "guardrail redacted content"
            );
        }
        Action::AllowWithWarning if !result.passed => {
            tracing::warn!(
                event = "guardrail.warn",
                side = ?side,
                use_case = %use_case,
                r#type = %result.r#type,
                variant = %result.variant_id,
                confidence = result.confidence,
                content_hash = %hash_content(before),
                message = %result.message,
                "guardrail flagged content with warning action"
            );
        }
        _ => {
            if result.severity >= Severity::Warning {
                tracing::debug!(
                    event = "guardrail.note",
                    side = ?side,
                    r#type = %result.r#type,
                    variant = %result.variant_id,
                    severity = ?result.severity,
                    error = ?result.error,
                    "guardrail result carries a warning-or-above severity"
                );
            }
        }
    }
}

/// Logs every result in a pipeline outcome's `results` list.
pub fn log_outcome(
    side: Side,
    use_case: crate::checkers::UseCase,
    before: &str,
    outcome: &crate::orchestrator::PipelineOutcome,
) {
    for result in &outcome.results {
        log_result(side, use_case, before, result);
    }
    if outcome.budget_exceeded {
        tracing::warn!(
            event = "guardrail.budget_exceeded",
            side = ?side,
            use_case = %use_case,
            "guardrail latency budget exceeded; some checkers were skipped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_sensitive_to_content() {
        let a = hash_content("hello world");
        let b = hash_content("hello world");
        let c = hash_content("different content");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_of_empty_string_is_known_sha256_value() {
        assert_eq!(
            hash_content(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

//! Checker construction and lookup.
//!
//! Built-in variants are constructed once, behind a `once_cell::sync::Lazy`
//! cache keyed by `(GuardrailType, variant_id)`, so concurrent first lookups
//! from different request tasks never double-build a checker (mirrors the
//! guarded-initializer pattern the reference gateway uses for its provider
//! clients).

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;

use super::{
    judge::HttpJudgeChecker, pii::PiiChecker, policy_compliance::PolicyComplianceChecker,
    prompt_injection::PromptInjectionChecker, secrets::SecretsChecker, toxicity::ToxicityChecker,
    Checker, GuardrailType,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no checker registered for type={guardrail_type} variant={variant_id}")]
    UnknownVariant {
        guardrail_type: GuardrailType,
        variant_id: String,
    },
    #[error("judge variant requires an endpoint URL but none was configured")]
    MissingJudgeEndpoint,
}

/// Key under which a checker instance is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VariantKey {
    guardrail_type: GuardrailType,
    variant_id: String,
}

/// Holds every constructed checker instance for the process lifetime.
///
/// The built-in `pattern_v1`/`blocklist_v1` variants are eagerly registered
/// at construction (they're cheap: regex compilation only). `all_in_one_judge`
/// variants are registered lazily per distinct endpoint URL, since each one
/// needs its own `reqwest::Client` base configuration.
pub struct CheckerRegistry {
    checkers: RwLock<HashMap<VariantKey, Arc<dyn Checker>>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        let mut checkers: HashMap<VariantKey, Arc<dyn Checker>> = HashMap::new();
        checkers.insert(
            VariantKey {
                guardrail_type: GuardrailType::PromptInjection,
                variant_id: "pattern_v1".to_string(),
            },
            Arc::new(PromptInjectionChecker::new()),
        );
        checkers.insert(
            VariantKey {
                guardrail_type: GuardrailType::Secrets,
                variant_id: "pattern_v1".to_string(),
            },
            Arc::new(SecretsChecker::new()),
        );
        checkers.insert(
            VariantKey {
                guardrail_type: GuardrailType::Pii,
                variant_id: "pattern_v1".to_string(),
            },
            Arc::new(PiiChecker::new()),
        );
        checkers.insert(
            VariantKey {
                guardrail_type: GuardrailType::Toxicity,
                variant_id: "pattern_v1".to_string(),
            },
            Arc::new(ToxicityChecker::new()),
        );
        // Registered only so `is_available`/`resolve` recognize the variant
        // during policy validation and health checks. The orchestrator never
        // dispatches to this instance: it builds a fresh
        // `PolicyComplianceChecker` per request from the live policy
        // snapshot's `extra["phrases"]` instead, so the blocklist can never
        // tear across a hot reload (see `orchestrator::select`).
        checkers.insert(
            VariantKey {
                guardrail_type: GuardrailType::PolicyCompliance,
                variant_id: "blocklist_v1".to_string(),
            },
            Arc::new(PolicyComplianceChecker::new(Vec::new())),
        );

        Self {
            checkers: RwLock::new(checkers),
        }
    }

    /// Look up a checker, constructing and caching judge variants on first
    /// use. `endpoint` is required the first time a given `variant_id` is
    /// resolved for `all_in_one_judge`; subsequent lookups reuse the cached
    /// instance regardless of `endpoint`.
    pub fn resolve(
        &self,
        guardrail_type: GuardrailType,
        variant_id: &str,
        endpoint: Option<&str>,
    ) -> Result<Arc<dyn Checker>, RegistryError> {
        let key = VariantKey {
            guardrail_type,
            variant_id: variant_id.to_string(),
        };

        if let Some(checker) = self.checkers.read().get(&key).cloned() {
            return Ok(checker);
        }

        if guardrail_type == GuardrailType::AllInOneJudge {
            let endpoint = endpoint.ok_or(RegistryError::MissingJudgeEndpoint)?;
            let checker: Arc<dyn Checker> = Arc::new(HttpJudgeChecker::new(endpoint.to_string()));
            self.checkers.write().insert(key, checker.clone());
            return Ok(checker);
        }

        Err(RegistryError::UnknownVariant {
            guardrail_type,
            variant_id: variant_id.to_string(),
        })
    }

    /// True if a variant is already constructed and ready to serve requests.
    pub fn is_available(&self, guardrail_type: GuardrailType, variant_id: &str) -> bool {
        let key = VariantKey {
            guardrail_type,
            variant_id: variant_id.to_string(),
        };
        self.checkers.read().contains_key(&key)
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_ins_are_available_without_explicit_registration() {
        let registry = CheckerRegistry::new();
        assert!(registry.is_available(GuardrailType::PromptInjection, "pattern_v1"));
        assert!(registry.is_available(GuardrailType::Pii, "pattern_v1"));
        assert!(registry.is_available(GuardrailType::Secrets, "pattern_v1"));
        assert!(registry.is_available(GuardrailType::Toxicity, "pattern_v1"));
        assert!(registry.is_available(GuardrailType::PolicyCompliance, "blocklist_v1"));
    }

    #[test]
    fn unknown_variant_errors() {
        let registry = CheckerRegistry::new();
        let err = registry
            .resolve(GuardrailType::Toxicity, "ml_v3", None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownVariant { .. }));
    }

    #[test]
    fn judge_requires_endpoint_on_first_resolve() {
        let registry = CheckerRegistry::new();
        let err = registry
            .resolve(GuardrailType::AllInOneJudge, "http_v1", None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingJudgeEndpoint));

        let checker = registry
            .resolve(
                GuardrailType::AllInOneJudge,
                "http_v1",
                Some("https://judge.internal/v1/score"),
            )
            .expect("endpoint supplied");
        assert_eq!(checker.capabilities().variant_id, "http_v1");
    }
}

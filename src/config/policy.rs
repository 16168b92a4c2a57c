//! The guardrail policy document: checker specs, per-use-case budgets and
//! preferred variants, and traffic rules (§3/§4.1).
//!
//! This is distinct from [`super::ServerConfig`]/[`super::ObservabilityConfig`]:
//! those are process configuration loaded once at startup, while `PolicyConfig`
//! is the hot-reloadable document served by `GET/PUT/POST /policy`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkers::{Action, CheckerRegistry, GuardrailType, UseCase};

/// One guardrail's configuration within a policy: which checker variant runs
/// it, at what threshold, for which side(s) of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerSpec {
    pub r#type: GuardrailType,
    pub variant_id: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_action")]
    pub action: Action,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub pre_filter: bool,
    #[serde(default)]
    pub post_filter: bool,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_threshold() -> f64 {
    0.7
}

fn default_action() -> Action {
    Action::Block
}

fn default_true() -> bool {
    true
}

impl CheckerSpec {
    /// `extra.fail_closed`, defaulting to `false` (fail-open per §4.2).
    pub fn fail_closed(&self) -> bool {
        self.extra
            .get("fail_closed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostFilterMode {
    Sync,
    Async,
}

/// Latency budget and variant preferences for one use case (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseCaseProfile {
    pub use_case: UseCase,
    pub total_budget_ms: u64,
    pub guardrail_budget_ms: u64,
    #[serde(default)]
    pub preferred_variants: HashMap<GuardrailType, String>,
    #[serde(default = "default_post_filter_mode")]
    pub post_filter_mode: PostFilterMode,
}

fn default_post_filter_mode() -> PostFilterMode {
    PostFilterMode::Sync
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessHours {
    pub tz: String,
    pub start: u32,
    pub end: u32,
}

/// Traffic rules applied by the rate limiter before pipeline entry (§4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateRules {
    #[serde(default)]
    pub per_minute: Option<u32>,
    #[serde(default)]
    pub per_hour: Option<u32>,
    #[serde(default)]
    pub per_day: Option<u32>,
    #[serde(default)]
    pub max_context_tokens: Option<u32>,
    #[serde(default)]
    pub max_upload_bytes: Option<u64>,
    #[serde(default)]
    pub allowed_geos: Option<Vec<String>>,
    #[serde(default)]
    pub business_hours: Option<BusinessHours>,
}

/// The hot-reloadable policy snapshot (§3 `Config`). Named `PolicyConfig`
/// here to avoid colliding with the process-level root config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub checkers: Vec<CheckerSpec>,
    #[serde(default)]
    pub use_cases: Vec<UseCaseProfile>,
    #[serde(default)]
    pub rate_rules: RateRules,
    #[serde(default = "default_action")]
    pub default_action: Action,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("checker {guardrail_type}/{variant_id} has no registry entry")]
    UnknownVariant {
        guardrail_type: GuardrailType,
        variant_id: String,
    },
    #[error("checker {guardrail_type}/{variant_id} has threshold {threshold} outside [0,1]")]
    ThresholdOutOfRange {
        guardrail_type: GuardrailType,
        variant_id: String,
        threshold: f64,
    },
    #[error("checker {guardrail_type}/{variant_id} has action=redact but variant cannot redact")]
    RedactNotSupported {
        guardrail_type: GuardrailType,
        variant_id: String,
    },
    #[error("duplicate checker spec for {guardrail_type}/{variant_id}")]
    DuplicateSpec {
        guardrail_type: GuardrailType,
        variant_id: String,
    },
    #[error("use case {use_case} has guardrail_budget_ms ({guardrail_budget_ms}) not strictly between 0 and total_budget_ms ({total_budget_ms})")]
    InvalidBudget {
        use_case: UseCase,
        guardrail_budget_ms: u64,
        total_budget_ms: u64,
    },
    #[error("checker {guardrail_type}/{variant_id} is enabled but runs on neither side (pre_filter and post_filter both false)")]
    NoFilterSide {
        guardrail_type: GuardrailType,
        variant_id: String,
    },
    #[error("invalid policy document: {0}")]
    Malformed(String),
}

impl PolicyConfig {
    /// The safe default policy (§4.1): prompt-injection block pre, pii
    /// redact pre+post, secrets block pre+post, toxicity block pre+post, all
    /// at threshold 0.7.
    pub fn default_policy() -> Self {
        let spec = |r#type: GuardrailType, action: Action, pre: bool, post: bool| CheckerSpec {
            r#type,
            variant_id: "pattern_v1".to_string(),
            threshold: 0.7,
            action,
            enabled: true,
            pre_filter: pre,
            post_filter: post,
            extra: HashMap::new(),
        };

        Self {
            checkers: vec![
                spec(GuardrailType::PromptInjection, Action::Block, true, false),
                spec(GuardrailType::Pii, Action::Redact, true, true),
                spec(GuardrailType::Secrets, Action::Block, true, true),
                spec(GuardrailType::Toxicity, Action::Block, true, true),
            ],
            use_cases: vec![
                UseCaseProfile {
                    use_case: UseCase::Chat,
                    total_budget_ms: 1500,
                    guardrail_budget_ms: 200,
                    preferred_variants: HashMap::new(),
                    post_filter_mode: PostFilterMode::Sync,
                },
                UseCaseProfile {
                    use_case: UseCase::Rag,
                    total_budget_ms: 3000,
                    guardrail_budget_ms: 400,
                    preferred_variants: HashMap::new(),
                    post_filter_mode: PostFilterMode::Sync,
                },
                UseCaseProfile {
                    use_case: UseCase::CodeGen,
                    total_budget_ms: 4000,
                    guardrail_budget_ms: 400,
                    preferred_variants: HashMap::new(),
                    post_filter_mode: PostFilterMode::Sync,
                },
                UseCaseProfile {
                    use_case: UseCase::Batch,
                    total_budget_ms: 20_000,
                    guardrail_budget_ms: 2000,
                    preferred_variants: HashMap::new(),
                    post_filter_mode: PostFilterMode::Async,
                },
            ],
            rate_rules: RateRules::default(),
            default_action: Action::Block,
        }
    }

    pub fn use_case_profile(&self, use_case: UseCase) -> Option<&UseCaseProfile> {
        self.use_cases.iter().find(|p| p.use_case == use_case)
    }

    /// Validates the document against the contract of §4.1. Does not mutate
    /// `self`; callers swap the snapshot only after this returns `Ok`.
    pub fn validate(&self, registry: &CheckerRegistry) -> Result<(), PolicyError> {
        let mut seen: Vec<(GuardrailType, String)> = Vec::new();

        for spec in &self.checkers {
            if !(0.0..=1.0).contains(&spec.threshold) {
                return Err(PolicyError::ThresholdOutOfRange {
                    guardrail_type: spec.r#type,
                    variant_id: spec.variant_id.clone(),
                    threshold: spec.threshold,
                });
            }

            let key = (spec.r#type, spec.variant_id.clone());
            if seen.contains(&key) {
                return Err(PolicyError::DuplicateSpec {
                    guardrail_type: spec.r#type,
                    variant_id: spec.variant_id.clone(),
                });
            }
            seen.push(key);

            if !spec.enabled {
                continue;
            }

            if !spec.pre_filter && !spec.post_filter {
                return Err(PolicyError::NoFilterSide {
                    guardrail_type: spec.r#type,
                    variant_id: spec.variant_id.clone(),
                });
            }

            if !registry.is_available(spec.r#type, &spec.variant_id) {
                let endpoint = spec
                    .extra
                    .get("endpoint")
                    .and_then(|v| v.as_str());
                if registry
                    .resolve(spec.r#type, &spec.variant_id, endpoint)
                    .is_err()
                {
                    return Err(PolicyError::UnknownVariant {
                        guardrail_type: spec.r#type,
                        variant_id: spec.variant_id.clone(),
                    });
                }
            }

            if spec.action == Action::Redact {
                let can_redact = registry
                    .resolve(spec.r#type, &spec.variant_id, None)
                    .map(|c| c.capabilities().can_redact)
                    .unwrap_or(false);
                if !can_redact {
                    return Err(PolicyError::RedactNotSupported {
                        guardrail_type: spec.r#type,
                        variant_id: spec.variant_id.clone(),
                    });
                }
            }
        }

        for profile in &self.use_cases {
            if !(profile.guardrail_budget_ms > 0
                && profile.guardrail_budget_ms < profile.total_budget_ms)
            {
                return Err(PolicyError::InvalidBudget {
                    use_case: profile.use_case,
                    guardrail_budget_ms: profile.guardrail_budget_ms,
                    total_budget_ms: profile.total_budget_ms,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_validates_against_builtin_registry() {
        let registry = CheckerRegistry::new();
        let policy = PolicyConfig::default_policy();
        assert!(policy.validate(&registry).is_ok());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        policy.checkers[0].threshold = 1.5;
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::ThresholdOutOfRange { .. }));
    }

    #[test]
    fn rejects_duplicate_spec() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        let dup = policy.checkers[0].clone();
        policy.checkers.push(dup);
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateSpec { .. }));
    }

    #[test]
    fn rejects_unknown_variant() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        policy.checkers[0].variant_id = "does_not_exist".to_string();
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::UnknownVariant { .. }));
    }

    #[test]
    fn rejects_redact_action_for_non_redacting_variant() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        // prompt_injection/pattern_v1 cannot redact.
        policy.checkers[0].action = Action::Redact;
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::RedactNotSupported { .. }));
    }

    #[test]
    fn rejects_invalid_budget_invariant() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        policy.use_cases[0].guardrail_budget_ms = policy.use_cases[0].total_budget_ms;
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidBudget { .. }));
    }

    #[test]
    fn rejects_enabled_spec_with_no_filter_side() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        policy.checkers[0].pre_filter = false;
        policy.checkers[0].post_filter = false;
        let err = policy.validate(&registry).unwrap_err();
        assert!(matches!(err, PolicyError::NoFilterSide { .. }));
    }

    #[test]
    fn allows_disabled_spec_with_no_filter_side() {
        let registry = CheckerRegistry::new();
        let mut policy = PolicyConfig::default_policy();
        policy.checkers[0].enabled = false;
        policy.checkers[0].pre_filter = false;
        policy.checkers[0].post_filter = false;
        assert!(policy.validate(&registry).is_ok());
    }
}

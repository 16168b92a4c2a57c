//! Process-level resource limits independent of the guardrail policy
//! document (whose own traffic limits live in [`super::policy::RateRules`]).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum size in bytes of a policy document accepted by
    /// `PUT /policy/{type}` or `POST /policy`. Prevents unbounded memory
    /// growth from a malformed or adversarial policy push.
    #[serde(default = "default_max_policy_document_bytes")]
    pub max_policy_document_bytes: usize,

    /// Maximum number of `CheckerSpec` entries accepted in a single policy
    /// document.
    #[serde(default = "default_max_checker_specs")]
    pub max_checker_specs: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_policy_document_bytes: default_max_policy_document_bytes(),
            max_checker_specs: default_max_checker_specs(),
        }
    }
}

fn default_max_policy_document_bytes() -> usize {
    1024 * 1024
}

fn default_max_checker_specs() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive_but_bounded() {
        let config = LimitsConfig::default();
        assert!(config.max_policy_document_bytes > 0);
        assert!(config.max_checker_specs > 0);
    }
}

//! Latency Budget Manager (§4.5): maps a `UseCase` to its `UseCaseProfile`
//! and exposes telemetry-only budget validation. Holds no control-flow
//! authority over checker deadlines — the orchestrator already enforces
//! those from the profile it reads directly off the policy snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    checkers::{GuardrailType, UseCase},
    config::policy::PolicyConfig,
};

/// Rebinds atomically, same discipline as the policy snapshot (§4.5): readers
/// clone the `Arc` under a brief read lock, a reload swaps it under a brief
/// write lock.
pub struct BudgetManager {
    policy: RwLock<Arc<PolicyConfig>>,
}

impl BudgetManager {
    pub fn new(policy: Arc<PolicyConfig>) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub fn rebind(&self, policy: Arc<PolicyConfig>) {
        *self.policy.write() = policy;
    }

    fn snapshot(&self) -> Arc<PolicyConfig> {
        self.policy.read().clone()
    }

    pub fn get_budget_ms(&self, use_case: UseCase) -> Option<(u64, u64)> {
        let policy = self.snapshot();
        policy
            .use_case_profile(use_case)
            .map(|p| (p.total_budget_ms, p.guardrail_budget_ms))
    }

    pub fn get_preferred_variant(
        &self,
        use_case: UseCase,
        guardrail_type: GuardrailType,
    ) -> Option<String> {
        let policy = self.snapshot();
        policy
            .use_case_profile(use_case)?
            .preferred_variants
            .get(&guardrail_type)
            .cloned()
    }

    /// Telemetry-only: reports whether a measured latency fit the use case's
    /// total budget. Never alters control flow — the orchestrator's deadline
    /// already ran by the time this is called.
    pub fn validate_budget(&self, use_case: UseCase, measured_ms: u64) -> (bool, String) {
        let policy = self.snapshot();
        match policy.use_case_profile(use_case) {
            Some(profile) if measured_ms <= profile.total_budget_ms => (
                true,
                format!(
                    "{measured_ms}ms within {}ms budget for {use_case}",
                    profile.total_budget_ms
                ),
            ),
            Some(profile) => (
                false,
                format!(
                    "{measured_ms}ms exceeded {}ms budget for {use_case}",
                    profile.total_budget_ms
                ),
            ),
            None => (
                false,
                format!("no use-case profile configured for {use_case}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_budget_for_known_use_case() {
        let manager = BudgetManager::new(Arc::new(PolicyConfig::default_policy()));
        let (total, guardrail) = manager.get_budget_ms(UseCase::Chat).unwrap();
        assert_eq!(total, 1500);
        assert_eq!(guardrail, 200);
    }

    #[test]
    fn validate_budget_is_telemetry_only_and_does_not_panic_on_overrun() {
        let manager = BudgetManager::new(Arc::new(PolicyConfig::default_policy()));
        let (fits, note) = manager.validate_budget(UseCase::Chat, 5000);
        assert!(!fits);
        assert!(note.contains("exceeded"));
    }

    #[test]
    fn rebind_swaps_the_snapshot_atomically() {
        let manager = BudgetManager::new(Arc::new(PolicyConfig::default_policy()));
        let mut updated = PolicyConfig::default_policy();
        updated.use_cases[0].total_budget_ms = 9000;
        manager.rebind(Arc::new(updated));
        let (total, _) = manager.get_budget_ms(UseCase::Chat).unwrap();
        assert_eq!(total, 9000);
    }
}

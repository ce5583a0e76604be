//! Policy checks evaluated before any operation side effect.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{CryptoError, CryptoResult};
use crate::models::OperationType;

/// Facts about a request that policy rules may inspect.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    /// Target key; `None` when generating a key without a chosen identifier
    pub key_id: Option<&'a str>,
    /// Algorithm named by the request, if any
    pub algorithm: Option<&'a str>,
    /// Creation time of the target key, when known
    pub created_at: Option<DateTime<Utc>>,
}

/// Decides whether an action may proceed. Stateless per call.
pub trait PolicyChecker: Send + Sync {
    /// Allow the action or fail with `PolicyViolation`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyViolation` naming the rule that rejected the action.
    fn enforce(&self, action: OperationType, context: &PolicyContext<'_>) -> CryptoResult<()>;

    /// Whether `enforce` needs `created_at`. Callers skip the key lookup
    /// when this is false.
    fn requires_key_age(&self) -> bool {
        false
    }
}

/// One restriction. Unset fields do not restrict.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyRule {
    /// Rule name reported in violations
    pub name: String,
    /// Actions the rule covers; empty covers every action
    pub actions: HashSet<OperationType>,
    /// Keys the covered actions may target
    pub allowed_key_ids: Option<HashSet<String>>,
    /// Algorithms the covered actions may name
    pub allowed_algorithms: Option<HashSet<String>>,
    /// Oldest key the covered actions may use
    pub max_key_age: Option<Duration>,
}

impl PolicyRule {
    /// Create a rule covering every action.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Restrict the rule to the given actions.
    #[must_use]
    pub fn for_actions(mut self, actions: impl IntoIterator<Item = OperationType>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    /// Allow only the given key identifiers.
    #[must_use]
    pub fn with_allowed_key_ids<I, S>(mut self, key_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_key_ids = Some(key_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Allow only the given algorithms.
    #[must_use]
    pub fn with_allowed_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_algorithms = Some(algorithms.into_iter().map(Into::into).collect());
        self
    }

    /// Reject keys older than `max_age`.
    #[must_use]
    pub fn with_max_key_age(mut self, max_age: Duration) -> Self {
        self.max_key_age = Some(max_age);
        self
    }

    /// Whether the rule applies to `action`.
    #[must_use]
    pub fn covers(&self, action: OperationType) -> bool {
        self.actions.is_empty() || self.actions.contains(&action)
    }

    fn check(&self, action: OperationType, context: &PolicyContext<'_>) -> CryptoResult<()> {
        if let Some(allowed) = &self.allowed_key_ids {
            match context.key_id {
                Some(key_id) if allowed.contains(key_id) => {}
                Some(key_id) => {
                    return Err(self.violation(action, &format!("key '{key_id}' is not allowed")))
                }
                None => return Err(self.violation(action, "a key identifier is required")),
            }
        }

        if let Some(allowed) = &self.allowed_algorithms {
            match context.algorithm {
                Some(algorithm) if allowed.contains(algorithm) => {}
                Some(algorithm) => {
                    return Err(
                        self.violation(action, &format!("algorithm '{algorithm}' is not allowed"))
                    )
                }
                None => return Err(self.violation(action, "an explicit algorithm is required")),
            }
        }

        if let (Some(max_age), Some(created_at)) = (self.max_key_age, context.created_at) {
            let age = (Utc::now() - created_at).to_std().unwrap_or_default();
            if age > max_age {
                return Err(self.violation(
                    action,
                    &format!("key age {}ms exceeds {}ms", age.as_millis(), max_age.as_millis()),
                ));
            }
        }

        Ok(())
    }

    fn violation(&self, action: OperationType, reason: &str) -> CryptoError {
        CryptoError::policy_violation(format!("rule '{}' rejected {action}: {reason}", self.name))
    }
}

/// Checker enforcing every covering rule. With no rules, everything passes.
#[derive(Debug, Clone, Default)]
pub struct RulePolicyChecker {
    rules: Vec<PolicyRule>,
}

impl RulePolicyChecker {
    /// Create a checker from rules.
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Add a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Configured rules.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

impl PolicyChecker for RulePolicyChecker {
    fn enforce(&self, action: OperationType, context: &PolicyContext<'_>) -> CryptoResult<()> {
        self.rules
            .iter()
            .filter(|rule| rule.covers(action))
            .try_for_each(|rule| rule.check(action, context))
    }

    fn requires_key_age(&self) -> bool {
        self.rules.iter().any(|rule| rule.max_key_age.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(key_id: &'a str, algorithm: Option<&'a str>) -> PolicyContext<'a> {
        PolicyContext {
            key_id: Some(key_id),
            algorithm,
            created_at: None,
        }
    }

    #[test]
    fn test_empty_checker_allows_everything() {
        let checker = RulePolicyChecker::default();
        assert!(checker.enforce(OperationType::Encrypt, &context("any", None)).is_ok());
        assert!(!checker.requires_key_age());
    }

    #[test]
    fn test_allowed_key_ids() {
        let checker = RulePolicyChecker::default()
            .with_rule(PolicyRule::new("tenants").with_allowed_key_ids(["tenant-a"]));

        assert!(checker.enforce(OperationType::Encrypt, &context("tenant-a", None)).is_ok());
        let err = checker
            .enforce(OperationType::Encrypt, &context("tenant-b", None))
            .unwrap_err();
        assert!(matches!(err, CryptoError::PolicyViolation(ref msg) if msg.contains("tenant-b")));
    }

    #[test]
    fn test_algorithm_rule_requires_explicit_algorithm() {
        let checker = RulePolicyChecker::default()
            .with_rule(PolicyRule::new("fips").with_allowed_algorithms(["AES-256-GCM"]));

        assert!(checker
            .enforce(OperationType::Encrypt, &context("k", Some("AES-256-GCM")))
            .is_ok());
        assert!(checker
            .enforce(OperationType::Encrypt, &context("k", Some("CHACHA20-POLY1305")))
            .is_err());
        assert!(checker.enforce(OperationType::Encrypt, &context("k", None)).is_err());
    }

    #[test]
    fn test_rule_only_covers_its_actions() {
        let checker = RulePolicyChecker::default().with_rule(
            PolicyRule::new("sign-only")
                .for_actions([OperationType::Sign])
                .with_allowed_key_ids(["signer"]),
        );

        assert!(checker.enforce(OperationType::Encrypt, &context("other", None)).is_ok());
        assert!(checker.enforce(OperationType::Sign, &context("other", None)).is_err());
    }

    #[test]
    fn test_max_key_age() {
        let checker = RulePolicyChecker::default()
            .with_rule(PolicyRule::new("fresh").with_max_key_age(Duration::from_secs(60)));
        assert!(checker.requires_key_age());

        let old = PolicyContext {
            key_id: Some("k"),
            algorithm: None,
            created_at: Some(Utc::now() - chrono::Duration::seconds(120)),
        };
        assert!(checker.enforce(OperationType::Encrypt, &old).is_err());

        let fresh = PolicyContext {
            created_at: Some(Utc::now()),
            ..old
        };
        assert!(checker.enforce(OperationType::Encrypt, &fresh).is_ok());
    }

    #[test]
    fn test_sub_second_age_limit_is_reported_in_millis() {
        let checker = RulePolicyChecker::default()
            .with_rule(PolicyRule::new("fresh").with_max_key_age(Duration::from_millis(20)));
        let stale = PolicyContext {
            key_id: Some("k"),
            algorithm: None,
            created_at: Some(Utc::now() - chrono::Duration::milliseconds(500)),
        };

        let err = checker.enforce(OperationType::Encrypt, &stale).unwrap_err();
        let CryptoError::PolicyViolation(msg) = err else {
            panic!("expected a policy violation, got {err:?}");
        };
        assert!(msg.contains("exceeds 20ms"), "{msg}");
        assert!(!msg.contains("0s"), "{msg}");
    }

    #[test]
    fn test_rule_deserializes() {
        let rule: PolicyRule = serde_json::from_str(
            r#"{"name":"r","actions":["encrypt"],"allowed_key_ids":["a"]}"#,
        )
        .unwrap();
        assert!(rule.covers(OperationType::Encrypt));
        assert!(!rule.covers(OperationType::Decrypt));
    }
}

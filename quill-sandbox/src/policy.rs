//! Rule-based execution policy and the composite security check.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dangerous::{DangerMatch, DangerousCommandDetector, Severity};

/// What to do with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    /// Run it.
    Allow,
    /// Refuse it.
    Deny,
    /// Require confirmation.
    Ask,
}

/// One ordered policy rule.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    /// Rule name, cited in verdicts.
    pub name: String,
    /// Commands this rule applies to.
    pub pattern: Regex,
    /// The decision when the pattern matches.
    pub decision: PolicyDecision,
    /// Why the rule exists, for display.
    pub reason: String,
}

impl PolicyRule {
    /// Build a rule, compiling `pattern` case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        decision: PolicyDecision,
        reason: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(&format!("(?i){pattern}"))?,
            decision,
            reason: reason.into(),
        })
    }
}

/// The outcome of evaluating a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    /// The decision.
    pub decision: PolicyDecision,
    /// The rule or detector pattern that produced it, if any.
    pub rule_name: Option<String>,
    /// Human-readable justification.
    pub reason: String,
}

/// First-match-wins rule engine with a configurable default.
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    default_decision: PolicyDecision,
}

impl PolicyEngine {
    /// Engine with no rules and the given default decision.
    #[must_use]
    pub fn new(default_decision: PolicyDecision) -> Self {
        Self {
            rules: Vec::new(),
            default_decision,
        }
    }

    /// Append a rule. Order is evaluation order.
    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The configured default decision.
    #[must_use]
    pub fn default_decision(&self) -> PolicyDecision {
        self.default_decision
    }

    /// Evaluate a command: the first matching rule wins, otherwise the
    /// default decision applies.
    #[must_use]
    pub fn evaluate(&self, command: &str) -> PolicyVerdict {
        for rule in &self.rules {
            if rule.pattern.is_match(command) {
                return PolicyVerdict {
                    decision: rule.decision,
                    rule_name: Some(rule.name.clone()),
                    reason: rule.reason.clone(),
                };
            }
        }
        PolicyVerdict {
            decision: self.default_decision,
            rule_name: None,
            reason: "no rule matched".to_string(),
        }
    }
}

/// Composite verdict from [`security_check`].
#[derive(Debug, Clone)]
pub struct SecurityVerdict {
    /// The final decision.
    pub decision: PolicyDecision,
    /// Justification, citing the detector pattern when one forced the
    /// outcome.
    pub reason: String,
    /// Everything the detector found, regardless of the decision.
    pub matches: Vec<DangerMatch>,
}

/// Evaluate a command against the policy engine with the detector as a
/// backstop.
///
/// A `critical` detection forces `Deny` no matter what the engine says; a
/// `high` detection escalates an engine `Allow` to `Ask`. Lower severities
/// ride along in `matches` for display.
#[must_use]
pub fn security_check(
    command: &str,
    engine: &PolicyEngine,
    detector: &DangerousCommandDetector,
) -> SecurityVerdict {
    let matches = detector.detect(command);

    if let Some(critical) = matches
        .iter()
        .find(|m| m.pattern.severity == Severity::Critical)
    {
        return SecurityVerdict {
            decision: PolicyDecision::Deny,
            reason: format!(
                "blocked by {}: {}",
                critical.pattern.name, critical.pattern.description
            ),
            matches,
        };
    }

    let verdict = engine.evaluate(command);
    let highest_high = matches
        .iter()
        .find(|m| m.pattern.severity == Severity::High);

    match (verdict.decision, highest_high) {
        (PolicyDecision::Allow, Some(high)) => SecurityVerdict {
            decision: PolicyDecision::Ask,
            reason: format!(
                "{} requires confirmation: {}",
                high.pattern.name, high.pattern.description
            ),
            matches,
        },
        _ => SecurityVerdict {
            decision: verdict.decision,
            reason: verdict.reason,
            matches,
        },
    }
}

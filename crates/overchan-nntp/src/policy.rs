//! Per-feed newsgroup policy.

use crate::{NntpError, NntpResult};
use glob::Pattern;

/// One policy rule: a glob pattern and its verdict.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pattern: Pattern,
    allow: bool,
}

impl PolicyRule {
    /// Compile a rule. `*` is the wildcard; `.` matches literally.
    pub fn new(pattern: &str, allow: bool) -> NntpResult<Self> {
        let pattern =
            Pattern::new(pattern).map_err(|e| NntpError::InvalidPolicy(e.to_string()))?;
        Ok(Self { pattern, allow })
    }
}

/// Ordered allow/deny rules over newsgroup names.
///
/// Evaluation scans in order and returns the first match's verdict;
/// nothing matching means deny.
#[derive(Debug, Clone, Default)]
pub struct FeedPolicy {
    rules: Vec<PolicyRule>,
}

impl FeedPolicy {
    /// Build a policy from `(pattern, allow)` pairs.
    pub fn new(rules: &[(String, bool)]) -> NntpResult<Self> {
        let rules = rules
            .iter()
            .map(|(p, allow)| PolicyRule::new(p, *allow))
            .collect::<NntpResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Policy that denies everything.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Does this policy admit a newsgroup?
    pub fn allows_newsgroup(&self, group: &str) -> bool {
        for rule in &self.rules {
            if rule.pattern.matches(group) {
                return rule.allow;
            }
        }
        false
    }
}

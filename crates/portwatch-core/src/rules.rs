//! Anomaly rules.
//!
//! A rule is a case-insensitive substring pattern matched against one field of
//! a snapshot subject. Rules are pure data: adding a rule never requires a
//! change to the classifier.
//!
//! In TOML a rule is either a bare keyword or a table:
//!
//! ```toml
//! rules = [
//!     "malware",
//!     { name = "old-openssh", pattern = "openssh_7", field = "version", scope = "process", severity = "high" },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::types::Severity;

/// Which subject string a rule is matched against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// Image tag for containers, executable path and name for processes
    #[default]
    Identity,
    /// Probed version string (processes only)
    Version,
}

/// Which subjects a rule applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Containers and processes
    #[default]
    Any,
    /// Containers only
    Container,
    /// Endpoint-owning processes only
    Process,
}

/// A single anomaly rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleRepr")]
pub struct Rule {
    /// Name reported in verdicts
    pub name: String,
    /// Substring to look for (case-insensitive)
    pub pattern: String,
    /// Subject field to match
    pub field: MatchField,
    /// Subjects the rule applies to
    pub scope: RuleScope,
    /// Severity of a match
    pub severity: Severity,
}

impl Rule {
    /// Keyword rule named after its pattern, matching identities of any subject
    #[must_use]
    pub fn keyword(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self {
            name: pattern.clone(),
            pattern,
            field: MatchField::Identity,
            scope: RuleScope::Any,
            severity: Severity::default(),
        }
    }

    /// Set the severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Restrict the scope
    #[must_use]
    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    /// Match against a different field
    #[must_use]
    pub fn with_field(mut self, field: MatchField) -> Self {
        self.field = field;
        self
    }

    /// Returns true if the rule covers containers
    #[must_use]
    pub const fn applies_to_containers(&self) -> bool {
        matches!(self.scope, RuleScope::Any | RuleScope::Container)
    }

    /// Returns true if the rule covers processes
    #[must_use]
    pub const fn applies_to_processes(&self) -> bool {
        matches!(self.scope, RuleScope::Any | RuleScope::Process)
    }

    /// Case-insensitive substring match
    #[must_use]
    pub fn matches(&self, haystack: &str) -> bool {
        haystack
            .to_lowercase()
            .contains(&self.pattern.to_lowercase())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    Keyword(String),
    Detailed {
        name: Option<String>,
        pattern: String,
        #[serde(default)]
        field: MatchField,
        #[serde(default)]
        scope: RuleScope,
        #[serde(default)]
        severity: Severity,
    },
}

impl From<RuleRepr> for Rule {
    fn from(repr: RuleRepr) -> Self {
        match repr {
            RuleRepr::Keyword(k) => Self::keyword(k),
            RuleRepr::Detailed {
                name,
                pattern,
                field,
                scope,
                severity,
            } => Self {
                name: name.unwrap_or_else(|| pattern.clone()),
                pattern,
                field,
                scope,
                severity,
            },
        }
    }
}

/// Ordered collection of rules; evaluation follows this order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build from explicit rules
    #[must_use]
    pub const fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Build keyword rules from plain strings
    #[must_use]
    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(keywords.into_iter().map(Rule::keyword).collect())
    }

    /// Default container rules: `suspicious`, `unknown`, `malware`
    #[must_use]
    pub fn default_container_rules() -> Self {
        Self::from_keywords(["suspicious", "unknown", "malware"])
    }

    /// Default host rules: malware keywords plus world-writable execution paths
    #[must_use]
    pub fn default_host_rules() -> Self {
        Self::new(vec![
            Rule::keyword("malware").with_severity(Severity::High),
            Rule::keyword("suspicious"),
            Rule {
                name: "tmp-executable".into(),
                pattern: "/tmp/".into(),
                field: MatchField::Identity,
                scope: RuleScope::Process,
                severity: Severity::High,
            },
            Rule {
                name: "shm-executable".into(),
                pattern: "/dev/shm/".into(),
                field: MatchField::Identity,
                scope: RuleScope::Process,
                severity: Severity::Critical,
            },
        ])
    }

    /// Check patterns are non-empty, names are unique and every rule can match
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.pattern.trim().is_empty() {
                return Err(CoreError::InvalidRule(format!(
                    "rule {:?} has an empty pattern",
                    rule.name
                )));
            }
            if rule.name.trim().is_empty() {
                return Err(CoreError::InvalidRule(format!(
                    "rule with pattern {:?} has an empty name",
                    rule.pattern
                )));
            }
            if rule.field == MatchField::Version && rule.scope == RuleScope::Container {
                return Err(CoreError::InvalidRule(format!(
                    "rule {:?} matches versions, which containers do not have",
                    rule.name
                )));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(CoreError::InvalidRule(format!(
                    "duplicate rule name {:?}",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    /// Rules in evaluation order
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

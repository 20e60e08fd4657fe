//! Rule-based anomaly classification.
//!
//! Verdicts come out in subject discovery order (endpoints, then containers),
//! and within one subject in rule order. Severity never reorders them.

use portwatch_core::{
    ContainerRecord, MatchField, ObservedEndpoint, Rule, RuleSet, ScanSnapshot, SubjectRef,
    Verdict,
};

/// Classify a snapshot against a rule set.
///
/// Pure: the same snapshot and rules always produce the same verdicts.
#[must_use]
pub fn classify(snapshot: &ScanSnapshot, rules: &RuleSet) -> Vec<Verdict> {
    let mut verdicts = Vec::new();

    for (index, observed) in snapshot.endpoints().iter().enumerate() {
        for rule in rules.iter().filter(|r| r.applies_to_processes()) {
            if let Some(evidence) = match_endpoint(rule, observed) {
                verdicts.push(Verdict {
                    subject: SubjectRef::Endpoint {
                        index,
                        ip: observed.endpoint.ip,
                        port: observed.endpoint.port,
                        pid: observed.endpoint.owning_pid,
                    },
                    matched_rule: rule.name.clone(),
                    severity: rule.severity,
                    evidence,
                });
            }
        }
    }

    for (index, container) in snapshot.containers().iter().enumerate() {
        for rule in rules.iter().filter(|r| r.applies_to_containers()) {
            if let Some(evidence) = match_container(rule, container) {
                verdicts.push(Verdict {
                    subject: SubjectRef::Container {
                        index,
                        id: container.id.clone(),
                        image_tag: container.image_tag.clone(),
                    },
                    matched_rule: rule.name.clone(),
                    severity: rule.severity,
                    evidence,
                });
            }
        }
    }

    verdicts
}

/// First identifying string of the endpoint's process that the rule matches.
fn match_endpoint(rule: &Rule, observed: &ObservedEndpoint) -> Option<String> {
    let process = observed.process.as_ref()?;
    match rule.field {
        MatchField::Identity => process
            .identities()
            .find(|id| rule.matches(id))
            .map(ToString::to_string),
        MatchField::Version => process
            .version()
            .filter(|v| rule.matches(v))
            .map(ToString::to_string),
    }
}

fn match_container(rule: &Rule, container: &ContainerRecord) -> Option<String> {
    match rule.field {
        MatchField::Identity => {
            rule.matches(&container.image_tag).then(|| container.image_tag.clone())
        }
        MatchField::Version => None,
    }
}

/// Classifier bound to one agent's rule set.
#[derive(Debug, Clone)]
pub struct AnomalyClassifier {
    rules: RuleSet,
}

impl AnomalyClassifier {
    /// Create a classifier for a (validated) rule set.
    #[must_use]
    pub const fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classify a snapshot.
    #[must_use]
    pub fn classify(&self, snapshot: &ScanSnapshot) -> Vec<Verdict> {
        classify(snapshot, &self.rules)
    }
}

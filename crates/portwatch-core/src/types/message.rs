//! Inter-agent messages: addresses, alert messages, and the wire body.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::snapshot::CycleId;
use super::verdict::Verdict;
use crate::error::{CoreError, Result};

/// Current version of the wire body format
pub const WIRE_VERSION: u16 = 1;

/// Address of an agent, in `name@domain` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentAddress {
    local: String,
    domain: String,
}

impl AgentAddress {
    /// Local part (before `@`)
    #[must_use]
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Domain part (after `@`)
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl FromStr for AgentAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (local, domain) = s
            .split_once('@')
            .ok_or_else(|| CoreError::InvalidAddress(format!("{s:?} is missing '@'")))?;

        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(local) || !valid(domain) {
            return Err(CoreError::InvalidAddress(format!(
                "{s:?} must look like name@domain"
            )));
        }

        Ok(Self {
            local: local.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for AgentAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AgentAddress> for String {
    fn from(addr: AgentAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Speech-act tag on an inter-agent message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Performative {
    /// Share a finding with the recipient
    #[default]
    Inform,
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inform => write!(f, "inform"),
        }
    }
}

/// Findings carried by an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Verdicts in classifier order
    pub verdicts: Vec<Verdict>,
    /// One-line human summary
    pub summary: String,
}

/// Alert derived from one cycle's non-empty verdicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    cycle_id: CycleId,
    sender: AgentAddress,
    recipient: AgentAddress,
    performative: Performative,
    payload: AlertPayload,
}

impl AlertMessage {
    /// Build an alert; returns `None` for an empty verdict set
    #[must_use]
    pub fn from_verdicts(
        cycle_id: CycleId,
        sender: AgentAddress,
        recipient: AgentAddress,
        verdicts: &[Verdict],
    ) -> Option<Self> {
        if verdicts.is_empty() {
            return None;
        }

        Some(Self {
            cycle_id,
            sender,
            recipient,
            performative: Performative::Inform,
            payload: AlertPayload {
                summary: summarize(cycle_id, verdicts),
                verdicts: verdicts.to_vec(),
            },
        })
    }

    /// Cycle whose snapshot produced the verdicts
    #[must_use]
    pub const fn cycle_id(&self) -> CycleId {
        self.cycle_id
    }

    /// Sending agent
    #[must_use]
    pub const fn sender(&self) -> &AgentAddress {
        &self.sender
    }

    /// Receiving agent
    #[must_use]
    pub const fn recipient(&self) -> &AgentAddress {
        &self.recipient
    }

    /// Always `inform`
    #[must_use]
    pub const fn performative(&self) -> Performative {
        self.performative
    }

    /// Verdicts and summary
    #[must_use]
    pub const fn payload(&self) -> &AlertPayload {
        &self.payload
    }

    /// Wire body for this alert
    #[must_use]
    pub fn to_body(&self) -> MessageBody {
        MessageBody::ScanAlert(ScanAlert {
            cycle_id: self.cycle_id,
            verdicts: self.payload.verdicts.clone(),
            summary: self.payload.summary.clone(),
        })
    }
}

fn summarize(cycle_id: CycleId, verdicts: &[Verdict]) -> String {
    let subjects: Vec<String> = verdicts
        .iter()
        .map(|v| format!("{} -> {}", v.subject, v.matched_rule))
        .collect();
    format!(
        "cycle {cycle_id}: {} suspicious finding(s): {}",
        verdicts.len(),
        subjects.join(", ")
    )
}

/// Scan alert body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAlert {
    /// Cycle that produced the alert
    pub cycle_id: CycleId,
    /// Matched verdicts
    pub verdicts: Vec<Verdict>,
    /// Human summary
    pub summary: String,
}

/// Discriminated message body.
///
/// Kinds this build does not know decode to [`MessageBody::Unknown`] so newer
/// senders do not break older receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Findings from a scan cycle
    ScanAlert(ScanAlert),
    /// Free-text notice
    Text {
        /// Notice text
        text: String,
    },
    /// A kind introduced by a newer sender
    #[serde(other)]
    Unknown,
}

impl MessageBody {
    /// Encode as a versioned JSON body
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&WireMessage {
            v: WIRE_VERSION,
            body: self.clone(),
        })?)
    }

    /// Decode a versioned JSON body
    pub fn decode(raw: &str) -> Result<WireMessage> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Versioned envelope around a [`MessageBody`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Format version of the sender
    pub v: u16,
    /// The body
    pub body: MessageBody,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Severity, SubjectRef};

    fn addr(s: &str) -> AgentAddress {
        s.parse().unwrap()
    }

    fn verdict(rule: &str) -> Verdict {
        Verdict {
            subject: SubjectRef::Container {
                index: 0,
                id: "abcdef012345".into(),
                image_tag: "unknown/unknown-builder:latest".into(),
            },
            matched_rule: rule.into(),
            severity: Severity::Medium,
            evidence: "unknown/unknown-builder:latest".into(),
        }
    }

    #[test]
    fn test_address_parse() {
        let a = addr("defender@LocalHost");
        assert_eq!(a.local(), "defender");
        assert_eq!(a.domain(), "localhost");
        assert_eq!(a.to_string(), "defender@localhost");

        assert!("defender".parse::<AgentAddress>().is_err());
        assert!("@localhost".parse::<AgentAddress>().is_err());
        assert!("a b@localhost".parse::<AgentAddress>().is_err());
    }

    #[test]
    fn test_address_serde_validates() {
        let ok: AgentAddress = serde_json::from_str(r#""monitor@localhost""#).unwrap();
        assert_eq!(ok.local(), "monitor");
        assert!(serde_json::from_str::<AgentAddress>(r#""nope""#).is_err());
    }

    #[test]
    fn test_alert_requires_verdicts() {
        let none = AlertMessage::from_verdicts(
            CycleId::FIRST,
            addr("a@localhost"),
            addr("b@localhost"),
            &[],
        );
        assert!(none.is_none());

        let alert = AlertMessage::from_verdicts(
            CycleId::new(7),
            addr("a@localhost"),
            addr("b@localhost"),
            &[verdict("unknown")],
        )
        .unwrap();
        assert_eq!(alert.cycle_id().get(), 7);
        assert_eq!(alert.performative(), Performative::Inform);
        assert!(alert.payload().summary.starts_with("cycle 7: 1 suspicious"));
    }

    #[test]
    fn test_wire_body_roundtrip_keeps_cycle() {
        let alert = AlertMessage::from_verdicts(
            CycleId::new(3),
            addr("a@localhost"),
            addr("b@localhost"),
            &[verdict("unknown"), verdict("malware")],
        )
        .unwrap();

        let raw = alert.to_body().encode().unwrap();
        let wire = MessageBody::decode(&raw).unwrap();
        assert_eq!(wire.v, WIRE_VERSION);
        match wire.body {
            MessageBody::ScanAlert(scan) => {
                assert_eq!(scan.cycle_id.get(), 3);
                assert_eq!(scan.verdicts.len(), 2);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let wire =
            MessageBody::decode(r#"{"v":2,"body":{"kind":"heartbeat","load":0.3}}"#).unwrap();
        assert_eq!(wire.v, 2);
        assert_eq!(wire.body, MessageBody::Unknown);
    }
}

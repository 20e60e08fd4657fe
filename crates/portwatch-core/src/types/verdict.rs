use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// How serious a rule match is
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Worth a look
    #[default]
    Medium,
    /// Likely compromise
    High,
    /// Act now
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Reference to the snapshot subject a verdict is about.
///
/// `index` is the position in the snapshot's endpoint or container list; the
/// remaining fields make the reference readable once it leaves the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectRef {
    /// A listening endpoint and its owning process
    Endpoint {
        index: usize,
        ip: Option<IpAddr>,
        port: Option<u16>,
        pid: Option<i32>,
    },
    /// A container record
    Container {
        index: usize,
        id: String,
        image_tag: String,
    },
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint { port, pid, .. } => {
                write!(f, "endpoint port {}", port.map_or_else(|| "?".into(), |p| p.to_string()))?;
                if let Some(pid) = pid {
                    write!(f, " (pid {pid})")?;
                }
                Ok(())
            }
            Self::Container { id, image_tag, .. } => write!(f, "container {id} ({image_tag})"),
        }
    }
}

/// One rule match against one snapshot subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// What matched
    pub subject: SubjectRef,
    /// Name of the rule that matched
    pub matched_rule: String,
    /// Severity configured on the rule
    pub severity: Severity,
    /// The subject string the rule matched against
    pub evidence: String,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} matched {:?} on {}",
            self.severity, self.subject, self.matched_rule, self.evidence
        )
    }
}

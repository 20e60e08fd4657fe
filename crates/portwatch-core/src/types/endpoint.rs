use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Transport protocol of a listening endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (v4 or v6)
    Tcp,
    /// UDP (v4 or v6)
    Udp,
    /// Protocol could not be determined
    #[default]
    Unknown,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A listening network endpoint observed on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Local bind address
    pub ip: Option<IpAddr>,

    /// Local port
    pub port: Option<u16>,

    /// Transport protocol
    pub protocol: Protocol,

    /// Process owning the socket, if the OS exposed it
    pub owning_pid: Option<i32>,
}

impl ServiceEndpoint {
    /// Create a new endpoint
    #[must_use]
    pub const fn new(
        ip: Option<IpAddr>,
        port: Option<u16>,
        protocol: Protocol,
        owning_pid: Option<i32>,
    ) -> Self {
        Self {
            ip,
            port,
            protocol,
            owning_pid,
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{ip}")?,
            None => write!(f, "?")?,
        }
        match self.port {
            Some(port) => write!(f, ":{port}/{}", self.protocol),
            None => write!(f, ":?/{}", self.protocol),
        }
    }
}

/// Why a process attribute could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Caller lacks privilege to inspect the process
    PermissionDenied,
    /// Lookup exceeded its time budget
    Timeout,
    /// Process exited before it could be inspected
    Gone,
    /// Any other provider failure
    Unavailable,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Timeout => write!(f, "timed out"),
            Self::Gone => write!(f, "process gone"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Outcome of a single best-effort process attribute lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    /// The attribute was read
    Resolved(String),
    /// The attribute could not be read
    Unresolved(UnresolvedReason),
}

impl Lookup {
    /// Returns the value if resolved
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Unresolved(_) => None,
        }
    }

    /// Returns true if the attribute was read
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(v) => f.write_str(v),
            Self::Unresolved(_) => f.write_str("unresolved"),
        }
    }
}

/// Best-effort mapping from a pid to its process identity.
///
/// `resolved` is derived from the two lookups and cannot be set directly, so a
/// degraded read is never mistaken for a complete one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AttributionRepr")]
pub struct ProcessAttribution {
    pid: i32,
    name: Lookup,
    executable_path: Lookup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    resolved: bool,
}

/// Wire shape on input; any `resolved` field present is ignored and recomputed.
#[derive(Deserialize)]
struct AttributionRepr {
    pid: i32,
    name: Lookup,
    executable_path: Lookup,
    #[serde(default)]
    version: Option<String>,
}

impl From<AttributionRepr> for ProcessAttribution {
    fn from(repr: AttributionRepr) -> Self {
        Self::new(repr.pid, repr.name, repr.executable_path).with_version(repr.version)
    }
}

impl ProcessAttribution {
    /// Build an attribution from the individual lookups
    #[must_use]
    pub const fn new(pid: i32, name: Lookup, executable_path: Lookup) -> Self {
        let resolved = name.is_resolved() && executable_path.is_resolved();
        Self {
            pid,
            name,
            executable_path,
            version: None,
            resolved,
        }
    }

    /// Attribution for a pid where nothing could be read
    #[must_use]
    pub const fn unresolved(pid: i32, reason: UnresolvedReason) -> Self {
        Self::new(pid, Lookup::Unresolved(reason), Lookup::Unresolved(reason))
    }

    /// Attach a probed version string
    #[must_use]
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Process ID
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Process name, if resolved
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.value()
    }

    /// Executable path, if resolved
    #[must_use]
    pub fn executable_path(&self) -> Option<&str> {
        self.executable_path.value()
    }

    /// Raw name lookup outcome
    #[must_use]
    pub const fn name_lookup(&self) -> &Lookup {
        &self.name
    }

    /// Raw executable path lookup outcome
    #[must_use]
    pub const fn executable_lookup(&self) -> &Lookup {
        &self.executable_path
    }

    /// Version string reported by the executable, if probed
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// True only when both name and executable path were read
    #[must_use]
    pub const fn resolved(&self) -> bool {
        self.resolved
    }

    /// Identifying strings used for rule matching: executable path first, then name
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.executable_path().into_iter().chain(self.name())
    }
}

//! Monitor configuration.
//!
//! Loaded from TOML; every section and field has a default so an empty (or
//! missing) file yields the stock two-agent setup. [`MonitorConfig::validate`]
//! must pass before any agent starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::rules::RuleSet;
use crate::types::AgentAddress;

/// Top-level configuration for all agents in one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Agent addresses
    pub agents: AgentsConfig,

    /// Host (listening socket) scan cycle
    pub host_scan: HostScanConfig,

    /// Container scan cycle
    pub container_scan: ContainerScanConfig,

    /// Provider and transport budgets
    pub timeouts: TimeoutConfig,
}

/// Addresses used on the message bus.
///
/// Kept as strings so a bad address is reported by `validate` with context
/// instead of failing the whole TOML parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Sender address of the host scanner
    pub host_scanner: String,
    /// Sender address of the container scanner
    pub container_scanner: String,
    /// Monitor (relay) agent
    pub monitor: String,
    /// Defender agent
    pub defender: String,
    /// Where scanners send their alerts
    pub alert_recipient: String,
}

/// Host scan cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostScanConfig {
    /// Run this agent
    pub enabled: bool,
    /// Idle time between cycles (seconds)
    pub idle_secs: u64,
    /// Where the JSON report is written each cycle
    pub report_path: Option<PathBuf>,
    /// Run `--version`/`-v`/`-V` against each resolved executable
    pub probe_versions: bool,
    /// Anomaly rules for this cycle
    pub rules: RuleSet,
}

/// Container scan cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerScanConfig {
    /// Run this agent
    pub enabled: bool,
    /// Idle time between cycles (seconds)
    pub idle_secs: u64,
    /// Where the JSON report is written each cycle (log-only when absent)
    pub report_path: Option<PathBuf>,
    /// Anomaly rules for this cycle
    pub rules: RuleSet,
}

/// Time budgets, all in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-lookup budget for process name / executable path
    pub attribution_secs: u64,
    /// Per-flag budget for version probes
    pub version_probe_secs: u64,
    /// Budget for a whole inventory provider call
    pub inventory_secs: u64,
    /// Budget for handing an alert to the transport
    pub send_secs: u64,
    /// Monitor receive poll
    pub monitor_receive_secs: u64,
    /// Defender receive poll
    pub defender_receive_secs: u64,
    /// Time an in-flight state gets to finish after a stop request
    pub stop_grace_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            host_scanner: String::from("networkdefender@localhost"),
            container_scanner: String::from("monitor2@localhost"),
            monitor: String::from("monitor@localhost"),
            defender: String::from("defender@localhost"),
            alert_recipient: String::from("defender@localhost"),
        }
    }
}

impl Default for HostScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_secs: default_host_idle(),
            report_path: Some(PathBuf::from("/tmp/network_defender_report.json")),
            probe_versions: false,
            rules: RuleSet::default_host_rules(),
        }
    }
}

impl Default for ContainerScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_secs: default_container_idle(),
            report_path: None,
            rules: RuleSet::default_container_rules(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attribution_secs: 3,
            version_probe_secs: 3,
            inventory_secs: 60,
            send_secs: 5,
            monitor_receive_secs: 5,
            defender_receive_secs: 10,
            stop_grace_secs: 5,
        }
    }
}

/// Parsed, validated agent addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddresses {
    /// Host scanner
    pub host_scanner: AgentAddress,
    /// Container scanner
    pub container_scanner: AgentAddress,
    /// Monitor
    pub monitor: AgentAddress,
    /// Defender
    pub defender: AgentAddress,
    /// Alert recipient
    pub alert_recipient: AgentAddress,
}

impl AgentsConfig {
    /// Parse every address, naming the offending field on failure
    pub fn resolve(&self) -> Result<ResolvedAddresses> {
        let parse = |field: &str, value: &str| -> Result<AgentAddress> {
            value
                .parse()
                .map_err(|e| CoreError::Config(format!("agents.{field}: {e}")))
        };

        Ok(ResolvedAddresses {
            host_scanner: parse("host_scanner", &self.host_scanner)?,
            container_scanner: parse("container_scanner", &self.container_scanner)?,
            monitor: parse("monitor", &self.monitor)?,
            defender: parse("defender", &self.defender)?,
            alert_recipient: parse("alert_recipient", &self.alert_recipient)?,
        })
    }
}

impl ResolvedAddresses {
    /// Check the bus can route: monitor and defender are distinct inboxes and
    /// alerts go to one of them.
    pub fn check_routing(&self) -> Result<()> {
        if self.monitor == self.defender {
            return Err(CoreError::Config(format!(
                "agents.monitor and agents.defender must differ (both {})",
                self.monitor
            )));
        }
        if self.alert_recipient != self.monitor && self.alert_recipient != self.defender {
            return Err(CoreError::Config(format!(
                "agents.alert_recipient: {} is not a local agent (expected {} or {})",
                self.alert_recipient, self.monitor, self.defender
            )));
        }
        Ok(())
    }
}

impl HostScanConfig {
    /// Idle duration
    #[must_use]
    pub const fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl ContainerScanConfig {
    /// Idle duration
    #[must_use]
    pub const fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl TimeoutConfig {
    /// Attribution budget
    #[must_use]
    pub const fn attribution(&self) -> Duration {
        Duration::from_secs(self.attribution_secs)
    }

    /// Version probe budget
    #[must_use]
    pub const fn version_probe(&self) -> Duration {
        Duration::from_secs(self.version_probe_secs)
    }

    /// Inventory provider budget
    #[must_use]
    pub const fn inventory(&self) -> Duration {
        Duration::from_secs(self.inventory_secs)
    }

    /// Transport send budget
    #[must_use]
    pub const fn send(&self) -> Duration {
        Duration::from_secs(self.send_secs)
    }

    /// Monitor receive poll
    #[must_use]
    pub const fn monitor_receive(&self) -> Duration {
        Duration::from_secs(self.monitor_receive_secs)
    }

    /// Defender receive poll
    #[must_use]
    pub const fn defender_receive(&self) -> Duration {
        Duration::from_secs(self.defender_receive_secs)
    }

    /// Stop grace period
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl MonitorConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Check everything that must hold before the first cycle.
    ///
    /// Returns the parsed addresses so callers do not parse twice.
    pub fn validate(&self) -> Result<ResolvedAddresses> {
        let addresses = self.agents.resolve()?;
        addresses.check_routing()?;

        self.host_scan
            .rules
            .validate()
            .map_err(|e| CoreError::Config(format!("host_scan.rules: {e}")))?;
        self.container_scan
            .rules
            .validate()
            .map_err(|e| CoreError::Config(format!("container_scan.rules: {e}")))?;

        let durations = [
            ("host_scan.idle_secs", self.host_scan.idle_secs),
            ("container_scan.idle_secs", self.container_scan.idle_secs),
            ("timeouts.attribution_secs", self.timeouts.attribution_secs),
            ("timeouts.version_probe_secs", self.timeouts.version_probe_secs),
            ("timeouts.inventory_secs", self.timeouts.inventory_secs),
            ("timeouts.send_secs", self.timeouts.send_secs),
            ("timeouts.monitor_receive_secs", self.timeouts.monitor_receive_secs),
            ("timeouts.defender_receive_secs", self.timeouts.defender_receive_secs),
            ("timeouts.stop_grace_secs", self.timeouts.stop_grace_secs),
        ];
        if let Some((field, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(CoreError::Config(format!("{field} must be greater than 0")));
        }

        if !self.host_scan.enabled && !self.container_scan.enabled {
            return Err(CoreError::Config(
                "at least one of host_scan or container_scan must be enabled".into(),
            ));
        }

        Ok(addresses)
    }
}

// Default value functions for serde.
const fn default_host_idle() -> u64 {
    30
}

const fn default_container_idle() -> u64 {
    3
}

//! Scan snapshot -- the immutable inventory captured by one cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::container::ContainerRecord;
use super::endpoint::{ProcessAttribution, ServiceEndpoint};

/// Monotonically increasing cycle identifier, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(u64);

impl CycleId {
    /// Identifier of the first cycle
    pub const FIRST: Self = Self(1);

    /// Wrap a raw identifier
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identifier of the following cycle
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A listening endpoint with its (optional) process attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEndpoint {
    /// The endpoint as reported by the OS
    pub endpoint: ServiceEndpoint,
    /// Attribution of the owning pid; absent when the OS reported no pid
    pub process: Option<ProcessAttribution>,
}

/// A provider that failed wholesale during collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// Provider name (e.g. `procfs-sockets`, `docker`)
    pub provider: String,
    /// Human-readable failure
    pub reason: String,
}

/// Point-in-time inventory for one cycle.
///
/// Fields are private: once built, a snapshot can only be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    cycle_id: CycleId,
    timestamp: DateTime<Utc>,
    endpoints: Vec<ObservedEndpoint>,
    containers: Vec<ContainerRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    degraded: Vec<Degradation>,
}

impl ScanSnapshot {
    /// Freeze collected inventory into a snapshot
    #[must_use]
    pub const fn new(
        cycle_id: CycleId,
        timestamp: DateTime<Utc>,
        endpoints: Vec<ObservedEndpoint>,
        containers: Vec<ContainerRecord>,
        degraded: Vec<Degradation>,
    ) -> Self {
        Self {
            cycle_id,
            timestamp,
            endpoints,
            containers,
            degraded,
        }
    }

    /// Empty snapshot, used when every provider failed
    #[must_use]
    pub const fn empty(cycle_id: CycleId, timestamp: DateTime<Utc>) -> Self {
        Self::new(cycle_id, timestamp, Vec::new(), Vec::new(), Vec::new())
    }

    /// Cycle that produced this snapshot
    #[must_use]
    pub const fn cycle_id(&self) -> CycleId {
        self.cycle_id
    }

    /// When collection finished
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Listening endpoints in discovery order
    #[must_use]
    pub fn endpoints(&self) -> &[ObservedEndpoint] {
        &self.endpoints
    }

    /// Containers in discovery order
    #[must_use]
    pub fn containers(&self) -> &[ContainerRecord] {
        &self.containers
    }

    /// Providers that failed wholesale this cycle
    #[must_use]
    pub fn degraded(&self) -> &[Degradation] {
        &self.degraded
    }

    /// Returns true if nothing was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty() && self.containers.is_empty()
    }

    /// Number of endpoints whose owning process was fully resolved
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.process.as_ref().is_some_and(ProcessAttribution::resolved))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lookup, Protocol, UnresolvedReason};

    #[test]
    fn test_cycle_id_sequence() {
        let first = CycleId::FIRST;
        assert_eq!(first.get(), 1);
        assert_eq!(first.next().get(), 2);
        assert!(first < first.next());
        assert_eq!(CycleId::new(u64::MAX).next().get(), u64::MAX);
    }

    #[test]
    fn test_resolved_count() {
        let ep = ServiceEndpoint::new(None, Some(80), Protocol::Tcp, Some(5));
        let snapshot = ScanSnapshot::new(
            CycleId::FIRST,
            Utc::now(),
            vec![
                ObservedEndpoint {
                    endpoint: ep.clone(),
                    process: Some(ProcessAttribution::new(
                        5,
                        Lookup::Resolved("nginx".into()),
                        Lookup::Resolved("/usr/sbin/nginx".into()),
                    )),
                },
                ObservedEndpoint {
                    endpoint: ep.clone(),
                    process: Some(ProcessAttribution::unresolved(6, UnresolvedReason::Gone)),
                },
                ObservedEndpoint {
                    endpoint: ep,
                    process: None,
                },
            ],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(snapshot.resolved_count(), 1);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ScanSnapshot::empty(CycleId::new(4), Utc::now());
        assert!(snapshot.is_empty());
        assert!(snapshot.degraded().is_empty());
        assert_eq!(snapshot.cycle_id().get(), 4);
    }
}

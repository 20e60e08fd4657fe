//! Snapshot collection: providers -> filter -> attribution -> freeze.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use portwatch_core::{
    ContainerRecord, CycleId, Degradation, ObservedEndpoint, ProcessAttribution, ScanSnapshot,
    ServiceEndpoint,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::attributor::Attributor;
use crate::error::{InventoryError, Result};
use crate::provider::{ContainerProvider, EndpointProvider, RawSocket};
use crate::version::VersionProbe;

/// Default budget for one whole provider call.
pub const DEFAULT_INVENTORY_TIMEOUT: Duration = Duration::from_secs(60);

/// Distinct pids resolved concurrently.
const ATTRIBUTION_CONCURRENCY: usize = 16;

/// Builds one [`ScanSnapshot`] per call from the configured providers.
///
/// Holds no state between calls other than its configuration, so replaying the
/// same provider output yields the same snapshot.
pub struct InventoryAdapter {
    endpoints: Option<Arc<dyn EndpointProvider>>,
    containers: Option<Arc<dyn ContainerProvider>>,
    attributor: Attributor,
    versions: Option<VersionProbe>,
    inventory_timeout: Duration,
}

impl InventoryAdapter {
    /// Adapter with no providers; add them with the `with_*` methods.
    pub fn new(attributor: Attributor) -> Self {
        Self {
            endpoints: None,
            containers: None,
            attributor,
            versions: None,
            inventory_timeout: DEFAULT_INVENTORY_TIMEOUT,
        }
    }

    /// Collect listening endpoints from this provider.
    #[must_use]
    pub fn with_endpoints(mut self, provider: Arc<dyn EndpointProvider>) -> Self {
        self.endpoints = Some(provider);
        self
    }

    /// Collect containers from this provider.
    #[must_use]
    pub fn with_containers(mut self, provider: Arc<dyn ContainerProvider>) -> Self {
        self.containers = Some(provider);
        self
    }

    /// Probe versions of resolved executables.
    #[must_use]
    pub fn with_version_probe(mut self, probe: VersionProbe) -> Self {
        self.versions = Some(probe);
        self
    }

    /// Budget for a whole provider call.
    #[must_use]
    pub fn with_inventory_timeout(mut self, timeout: Duration) -> Self {
        self.inventory_timeout = timeout;
        self
    }

    /// Collect a snapshot stamped with the current time.
    pub async fn collect(&self, cycle_id: CycleId) -> ScanSnapshot {
        self.collect_at(cycle_id, Utc::now()).await
    }

    /// Collect a snapshot with an explicit timestamp.
    pub async fn collect_at(&self, cycle_id: CycleId, timestamp: DateTime<Utc>) -> ScanSnapshot {
        let mut degraded = Vec::new();

        let endpoints = match &self.endpoints {
            Some(provider) => match self.fetch_sockets(provider).await {
                Ok(raw) => self.attribute(raw).await,
                Err(e) => {
                    warn!(%cycle_id, provider = provider.name(), error = %e, "endpoint inventory unavailable; continuing with empty endpoint list");
                    degraded.push(Degradation {
                        provider: provider.name().to_string(),
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let containers = match &self.containers {
            Some(provider) => match self.fetch_containers(provider.as_ref()).await {
                Ok(list) => list,
                Err(e) => {
                    warn!(%cycle_id, provider = provider.name(), error = %e, "container inventory unavailable; continuing with empty container list");
                    degraded.push(Degradation {
                        provider: provider.name().to_string(),
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let snapshot = ScanSnapshot::new(cycle_id, timestamp, endpoints, containers, degraded);
        info!(
            %cycle_id,
            endpoints = snapshot.endpoints().len(),
            resolved = snapshot.resolved_count(),
            containers = snapshot.containers().len(),
            degraded = snapshot.degraded().len(),
            "inventory collected"
        );
        snapshot
    }

    async fn fetch_sockets(&self, provider: &Arc<dyn EndpointProvider>) -> Result<Vec<RawSocket>> {
        let provider = Arc::clone(provider);
        let task = tokio::task::spawn_blocking(move || provider.sockets());
        match tokio::time::timeout(self.inventory_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(InventoryError::Other(join_err.to_string())),
            Err(_) => Err(InventoryError::Timeout(self.inventory_timeout)),
        }
    }

    async fn fetch_containers(&self, provider: &dyn ContainerProvider) -> Result<Vec<ContainerRecord>> {
        tokio::time::timeout(self.inventory_timeout, provider.containers())
            .await
            .map_err(|_| InventoryError::Timeout(self.inventory_timeout))?
    }

    /// Keep listening sockets and attach one attribution per distinct pid.
    async fn attribute(&self, raw: Vec<RawSocket>) -> Vec<ObservedEndpoint> {
        let total = raw.len();
        let listening: Vec<ServiceEndpoint> = raw
            .into_iter()
            .filter(|s| s.listening)
            .map(|s| {
                ServiceEndpoint::new(
                    s.local.map(|a| a.ip()),
                    s.local.map(|a| a.port()),
                    s.protocol,
                    s.pid,
                )
            })
            .collect();
        debug!(total, listening = listening.len(), "filtered sockets");

        let mut pids: Vec<i32> = listening.iter().filter_map(|e| e.owning_pid).collect();
        pids.sort_unstable();
        pids.dedup();

        let attributions: HashMap<i32, ProcessAttribution> = stream::iter(pids)
            .map(|pid| async move { (pid, self.resolve_with_version(pid).await) })
            .buffered(ATTRIBUTION_CONCURRENCY)
            .collect()
            .await;

        listening
            .into_iter()
            .map(|endpoint| {
                let process = endpoint
                    .owning_pid
                    .and_then(|pid| attributions.get(&pid).cloned());
                ObservedEndpoint { endpoint, process }
            })
            .collect()
    }

    async fn resolve_with_version(&self, pid: i32) -> ProcessAttribution {
        let attribution = self.attributor.resolve(pid).await;
        let Some(probe) = &self.versions else {
            return attribution;
        };
        let Some(exe) = attribution.executable_path().map(ToString::to_string) else {
            return attribution;
        };
        let version = probe.probe(Path::new(&exe)).await;
        attribution.with_version(version)
    }
}

impl std::fmt::Debug for InventoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryAdapter")
            .field("endpoints", &self.endpoints.as_ref().map(|p| p.name()))
            .field("containers", &self.containers.as_ref().map(|p| p.name()))
            .field("attributor", &self.attributor)
            .field("versions", &self.versions)
            .field("inventory_timeout", &self.inventory_timeout)
            .finish()
    }
}

//! Builds the agents described by a validated configuration.

use anyhow::Result;
use portwatch_agent::{
    AlertDispatcher, AnomalyClassifier, CycleScheduler, DefenderConsumer, JsonFileSink, LocalBus,
    LogReportSink, MonitorConsumer, SchedulerSettings,
};
use portwatch_core::config::ResolvedAddresses;
use portwatch_core::MonitorConfig;
use portwatch_inventory::discovery::{
    DockerContainerProvider, ProcfsProcessProvider, ProcfsSocketProvider,
};
use portwatch_inventory::{Attributor, InventoryAdapter, VersionProbe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Every agent of one process, wired to one bus.
pub struct AgentSet {
    /// Scan cycles (host first, then containers, when enabled)
    pub schedulers: Vec<CycleScheduler>,
    /// Relay agent
    pub monitor: MonitorConsumer,
    /// Response agent
    pub defender: DefenderConsumer,
}

fn attributor(config: &MonitorConfig) -> Attributor {
    Attributor::with_timeout(
        Arc::new(ProcfsProcessProvider),
        config.timeouts.attribution(),
    )
}

/// Inventory of listening sockets and their owning processes.
pub fn host_inventory(config: &MonitorConfig, probe_versions: bool) -> InventoryAdapter {
    let adapter = InventoryAdapter::new(attributor(config))
        .with_endpoints(Arc::new(ProcfsSocketProvider))
        .with_inventory_timeout(config.timeouts.inventory());

    if probe_versions {
        adapter.with_version_probe(VersionProbe::new(config.timeouts.version_probe()))
    } else {
        adapter
    }
}

/// Inventory of containers from the local engine.
///
/// A client that cannot be configured leaves the adapter without a container
/// provider; cycles then run on empty container lists.
pub fn container_inventory(config: &MonitorConfig) -> InventoryAdapter {
    let adapter = InventoryAdapter::new(attributor(config))
        .with_inventory_timeout(config.timeouts.inventory());

    match DockerContainerProvider::connect() {
        Ok(docker) => adapter.with_containers(Arc::new(docker)),
        Err(e) => {
            warn!(error = %e, "container engine client unavailable; container inventory disabled");
            adapter
        }
    }
}

/// Wire schedulers and consumers onto one bus.
///
/// Fails when the alert recipient is not one of the local agents.
pub fn build(
    config: &MonitorConfig,
    addrs: &ResolvedAddresses,
    shutdown: &CancellationToken,
) -> Result<AgentSet> {
    let mut builder = LocalBus::builder();
    let monitor_inbox = builder.register(addrs.monitor.clone());
    let defender_inbox = builder.register(addrs.defender.clone());
    let bus = Arc::new(builder.build());

    if !bus.is_registered(&addrs.alert_recipient) {
        anyhow::bail!(
            "alert recipient {} is not a local agent (expected {} or {})",
            addrs.alert_recipient,
            addrs.monitor,
            addrs.defender
        );
    }

    let dispatcher = |sender| {
        AlertDispatcher::new(sender, addrs.alert_recipient.clone(), bus.clone())
            .with_send_timeout(config.timeouts.send())
    };

    let mut schedulers = Vec::new();

    if config.host_scan.enabled {
        let mut scheduler = CycleScheduler::new(
            addrs.host_scanner.clone(),
            host_inventory(config, config.host_scan.probe_versions),
            AnomalyClassifier::new(config.host_scan.rules.clone()),
            dispatcher(addrs.host_scanner.clone()),
            SchedulerSettings {
                idle: config.host_scan.idle(),
                stop_grace: config.timeouts.stop_grace(),
            },
        )
        .with_shutdown(shutdown.child_token());
        if let Some(path) = &config.host_scan.report_path {
            scheduler = scheduler.with_sink(Box::new(JsonFileSink::new(path)));
        }
        schedulers.push(scheduler);
    }

    if config.container_scan.enabled {
        let mut scheduler = CycleScheduler::new(
            addrs.container_scanner.clone(),
            container_inventory(config),
            AnomalyClassifier::new(config.container_scan.rules.clone()),
            dispatcher(addrs.container_scanner.clone()),
            SchedulerSettings {
                idle: config.container_scan.idle(),
                stop_grace: config.timeouts.stop_grace(),
            },
        )
        .with_shutdown(shutdown.child_token())
        .with_sink(Box::new(LogReportSink));
        if let Some(path) = &config.container_scan.report_path {
            scheduler = scheduler.with_sink(Box::new(JsonFileSink::new(path)));
        }
        schedulers.push(scheduler);
    }

    let monitor = MonitorConsumer::new(Box::new(monitor_inbox), addrs.defender.clone(), bus.clone())
        .with_receive_timeout(config.timeouts.monitor_receive());
    let defender = DefenderConsumer::new(Box::new(defender_inbox))
        .with_receive_timeout(config.timeouts.defender_receive());

    Ok(AgentSet {
        schedulers,
        monitor,
        defender,
    })
}

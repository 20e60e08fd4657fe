//! `portwatch scan` - one snapshot, classified, nothing sent.

use anyhow::{Context as _, Result};
use portwatch_agent::classify;
use portwatch_core::CycleId;
use tracing::debug;

use super::Context;
use crate::agents;
use crate::cli::args::ScanArgs;
use crate::config;
use crate::output::{print_reports, CycleReport};

pub async fn execute(ctx: Context, args: ScanArgs) -> Result<()> {
    let (path, config) = config::load(ctx.config_path.as_deref())?;
    let addrs = config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    let mut results = Vec::new();

    if args.target.host() {
        let inventory =
            agents::host_inventory(&config, args.versions || config.host_scan.probe_versions);
        let snapshot = inventory.collect(CycleId::FIRST).await;
        let verdicts = classify(&snapshot, &config.host_scan.rules);
        results.push((addrs.host_scanner.to_string(), snapshot, verdicts));
    }

    if args.target.containers() {
        let inventory = agents::container_inventory(&config);
        let snapshot = inventory.collect(CycleId::FIRST).await;
        let verdicts = classify(&snapshot, &config.container_scan.rules);
        results.push((addrs.container_scanner.to_string(), snapshot, verdicts));
    }

    let reports: Vec<CycleReport<'_>> = results
        .iter()
        .map(|(agent, snapshot, verdicts)| CycleReport {
            agent: agent.clone(),
            snapshot,
            verdicts,
            alerted: false,
        })
        .collect();
    print_reports(&reports, ctx.output_format)?;

    let findings: usize = reports.iter().map(|r| r.verdicts.len()).sum();
    debug!(findings, "scan finished");
    Ok(())
}

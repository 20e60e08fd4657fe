//! `portwatch run` - run the agents.

use anyhow::{Context as _, Result};
use portwatch_agent::{CycleScheduler, DefenderConsumer, MonitorConsumer};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Context;
use crate::agents::{self, AgentSet};
use crate::cli::args::RunArgs;
use crate::config;
use crate::output::{print_reports, CycleReport};

/// Receive timeout used to drain inboxes after `--once`.
const ONCE_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

pub async fn execute(ctx: Context, args: RunArgs) -> Result<()> {
    let (path, mut config) = config::load(ctx.config_path.as_deref())?;
    config::apply_overrides(&mut config, &args);

    // Configuration errors are fatal before the first cycle.
    let addrs = config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    let shutdown = CancellationToken::new();
    let agents = agents::build(&config, &addrs, &shutdown)?;

    if args.once {
        return run_once(agents, &ctx).await;
    }
    run_until_stopped(agents, shutdown).await
}

async fn run_until_stopped(agents: AgentSet, shutdown: CancellationToken) -> Result<()> {
    let AgentSet {
        schedulers,
        mut monitor,
        mut defender,
    } = agents;

    let mut tasks = JoinSet::new();
    for mut scheduler in schedulers {
        tasks.spawn(async move {
            let state = scheduler.run().await;
            format!("{} halted in {state}", scheduler.agent())
        });
    }
    let stop = shutdown.clone();
    tasks.spawn(async move {
        monitor.run(stop).await;
        "monitor stopped".to_string()
    });
    let stop = shutdown.clone();
    tasks.spawn(async move {
        defender.run(stop).await;
        "defender stopped".to_string()
    });

    shutdown_signal().await;
    shutdown.cancel();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(summary) => info!("{summary}"),
            Err(e) => warn!(error = %e, "agent task failed"),
        }
    }
    Ok(())
}

async fn run_once(agents: AgentSet, ctx: &Context) -> Result<()> {
    let AgentSet {
        mut schedulers,
        monitor,
        defender,
    } = agents;

    for scheduler in &mut schedulers {
        scheduler.run_until_idle().await;
    }

    let reports: Vec<CycleReport<'_>> = schedulers.iter().filter_map(report_for).collect();
    print_reports(&reports, ctx.output_format)?;

    drain(monitor, defender).await;
    Ok(())
}

fn report_for(scheduler: &CycleScheduler) -> Option<CycleReport<'_>> {
    let context = scheduler.context()?;
    Some(CycleReport {
        agent: scheduler.agent().to_string(),
        snapshot: context.snapshot(),
        verdicts: context.verdicts(),
        alerted: context.alert().is_some(),
    })
}

/// Let the monitor relay and the defender act on this run's alerts.
async fn drain(monitor: MonitorConsumer, defender: DefenderConsumer) {
    let mut monitor = monitor.with_receive_timeout(ONCE_DRAIN_TIMEOUT);
    let mut defender = defender.with_receive_timeout(ONCE_DRAIN_TIMEOUT);

    while let Ok(Some(_)) = monitor.poll().await {}
    while let Ok(Some(_)) = defender.poll().await {}

    let stats = defender.stats();
    info!(
        relayed = monitor.relayed(),
        alerts = stats.alerts,
        notices = stats.notices,
        "alerts delivered"
    );
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, stopping agents"),
        () = terminate => info!("received terminate signal, stopping agents"),
    }
}

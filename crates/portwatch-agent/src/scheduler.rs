//! The per-agent scan cycle.
//!
//! `SCAN -> ANALYSE -> REPORT_ALERT -> IDLE -> SCAN`, one state per
//! [`CycleScheduler::tick`]. Every state has exactly one successor; failures
//! inside a state degrade its data, never the transition.

use portwatch_core::{AgentAddress, AlertMessage, CycleId, ScanSnapshot, Verdict};
use portwatch_inventory::InventoryAdapter;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classifier::AnomalyClassifier;
use crate::dispatcher::AlertDispatcher;
use crate::report::ReportSink;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// Collect a fresh snapshot
    Scan,
    /// Classify the snapshot
    Analyse,
    /// Dispatch the alert (if any) and persist the report
    ReportAlert,
    /// Wait for the next cycle
    Idle,
}

impl CycleState {
    /// The only state that may follow this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Scan => Self::Analyse,
            Self::Analyse => Self::ReportAlert,
            Self::ReportAlert => Self::Idle,
            Self::Idle => Self::Scan,
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "SCAN"),
            Self::Analyse => write!(f, "ANALYSE"),
            Self::ReportAlert => write!(f, "REPORT_ALERT"),
            Self::Idle => write!(f, "IDLE"),
        }
    }
}

/// Everything one cycle produces, replaced wholesale on each SCAN.
#[derive(Debug, Clone)]
pub struct CycleContext {
    cycle_id: CycleId,
    snapshot: ScanSnapshot,
    verdicts: Vec<Verdict>,
    alert: Option<AlertMessage>,
}

impl CycleContext {
    fn new(snapshot: ScanSnapshot) -> Self {
        Self {
            cycle_id: snapshot.cycle_id(),
            snapshot,
            verdicts: Vec::new(),
            alert: None,
        }
    }

    /// Cycle identifier.
    #[must_use]
    pub const fn cycle_id(&self) -> CycleId {
        self.cycle_id
    }

    /// Snapshot taken by this cycle's SCAN.
    #[must_use]
    pub const fn snapshot(&self) -> &ScanSnapshot {
        &self.snapshot
    }

    /// Verdicts from ANALYSE (empty before ANALYSE or on a clean cycle).
    #[must_use]
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Alert produced in REPORT_ALERT, if any.
    #[must_use]
    pub const fn alert(&self) -> Option<&AlertMessage> {
        self.alert.as_ref()
    }
}

/// Timing for one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Wait between cycles
    pub idle: Duration,
    /// Budget an in-flight state gets after a stop request
    pub stop_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Result of one [`CycleScheduler::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The state's work completed and the scheduler moved on.
    Advanced {
        from: CycleState,
        to: CycleState,
        cycle_id: Option<CycleId>,
    },
    /// A stop was requested; the scheduler stays in `state`.
    Halted { state: CycleState },
}

/// Drives one agent's SCAN/ANALYSE/REPORT_ALERT/IDLE cycle.
pub struct CycleScheduler {
    agent: AgentAddress,
    state: CycleState,
    next_cycle: CycleId,
    context: Option<CycleContext>,
    inventory: InventoryAdapter,
    classifier: AnomalyClassifier,
    dispatcher: AlertDispatcher,
    sinks: Vec<Box<dyn ReportSink>>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
}

impl CycleScheduler {
    /// Create a scheduler in `SCAN`, about to start cycle 1.
    pub fn new(
        agent: AgentAddress,
        inventory: InventoryAdapter,
        classifier: AnomalyClassifier,
        dispatcher: AlertDispatcher,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            agent,
            state: CycleState::Scan,
            next_cycle: CycleId::FIRST,
            context: None,
            inventory,
            classifier,
            dispatcher,
            sinks: Vec::new(),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Add a report sink. Sinks run in the order added.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Use an externally owned stop token.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Agent this scheduler runs for.
    #[must_use]
    pub const fn agent(&self) -> &AgentAddress {
        &self.agent
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CycleState {
        self.state
    }

    /// Context of the current (or last finished) cycle.
    #[must_use]
    pub const fn context(&self) -> Option<&CycleContext> {
        self.context.as_ref()
    }

    /// Token that stops this scheduler.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn current_cycle(&self) -> Option<CycleId> {
        self.context.as_ref().map(CycleContext::cycle_id)
    }

    /// Run the current state's work to completion and transition.
    ///
    /// Returns [`TickOutcome::Halted`] without doing any work once a stop
    /// was requested, and from `IDLE` if the stop arrives during the wait.
    pub async fn tick(&mut self) -> TickOutcome {
        let from = self.state;
        if self.shutdown.is_cancelled() {
            return TickOutcome::Halted { state: from };
        }

        match from {
            CycleState::Scan => self.scan().await,
            CycleState::Analyse => self.analyse(),
            CycleState::ReportAlert => self.report_alert().await,
            CycleState::Idle => {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.idle) => {}
                    () = self.shutdown.cancelled() => {
                        debug!(agent = %self.agent, "stop requested while idle");
                        return TickOutcome::Halted { state: from };
                    }
                }
            }
        }

        self.state = from.next();
        TickOutcome::Advanced {
            from,
            to: self.state,
            cycle_id: self.current_cycle(),
        }
    }

    async fn scan(&mut self) {
        let cycle_id = self.next_cycle;
        self.next_cycle = cycle_id.next();
        debug!(agent = %self.agent, %cycle_id, "scan started");

        let snapshot = self.inventory.collect(cycle_id).await;
        self.context = Some(CycleContext::new(snapshot));
    }

    fn analyse(&mut self) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        ctx.verdicts = self.classifier.classify(&ctx.snapshot);
        if ctx.verdicts.is_empty() {
            debug!(agent = %self.agent, cycle_id = %ctx.cycle_id, "clean cycle");
        } else {
            info!(agent = %self.agent, cycle_id = %ctx.cycle_id, verdicts = ctx.verdicts.len(), "suspicious findings");
        }
    }

    async fn report_alert(&mut self) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };

        if !ctx.verdicts.is_empty() {
            ctx.alert = self.dispatcher.dispatch(ctx.cycle_id, &ctx.verdicts).await;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.persist(&ctx.snapshot, &ctx.verdicts).await {
                warn!(agent = %self.agent, cycle_id = %ctx.cycle_id, sink = sink.name(), error = %e, "report not persisted");
            }
        }
    }

    /// Tick until a stop is requested.
    ///
    /// After the stop, the in-flight state gets `stop_grace` to finish;
    /// past that it is dropped. Returns the state the scheduler halted in.
    #[instrument(skip(self), fields(agent = %self.agent))]
    pub async fn run(&mut self) -> CycleState {
        let shutdown = self.shutdown.clone();
        let grace = self.settings.stop_grace;
        info!(idle = ?self.settings.idle, "scheduler started");

        loop {
            let outcome = {
                let tick = self.tick();
                tokio::pin!(tick);
                tokio::select! {
                    outcome = &mut tick => Some(outcome),
                    () = shutdown.cancelled() => tokio::time::timeout(grace, &mut tick).await.ok(),
                }
            };

            match outcome {
                Some(TickOutcome::Advanced { from, to, cycle_id }) => {
                    debug!(%from, %to, cycle_id = ?cycle_id.map(CycleId::get), "transition");
                }
                Some(TickOutcome::Halted { state }) => {
                    info!(%state, "scheduler stopped");
                    return state;
                }
                None => {
                    warn!(state = %self.state, grace = ?grace, "in-flight state abandoned after stop grace period");
                    return self.state;
                }
            }
        }
    }

    /// Run one full cycle from the current state up to `IDLE`.
    ///
    /// Returns the finished cycle's context, or `None` if a stop was requested
    /// first.
    pub async fn run_until_idle(&mut self) -> Option<&CycleContext> {
        loop {
            match self.tick().await {
                TickOutcome::Advanced { to: CycleState::Idle, .. } => return self.context.as_ref(),
                TickOutcome::Advanced { .. } => {}
                TickOutcome::Halted { .. } => return None,
            }
        }
    }
}

impl fmt::Debug for CycleScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleScheduler")
            .field("agent", &self.agent)
            .field("state", &self.state)
            .field("next_cycle", &self.next_cycle)
            .field("settings", &self.settings)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::transport::{Inbox, LocalBus, LocalInbox};
    use async_trait::async_trait;
    use portwatch_core::{ContainerRecord, MessageBody, Protocol, RuleSet};
    use portwatch_inventory::{
        Attributor, ContainerProvider, EndpointProvider, InventoryError, ProcessProvider, RawSocket,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn addr(s: &str) -> AgentAddress {
        s.parse().unwrap()
    }

    struct Sockets(Option<Vec<RawSocket>>);

    impl EndpointProvider for Sockets {
        fn name(&self) -> &'static str {
            "test-sockets"
        }

        fn sockets(&self) -> portwatch_inventory::Result<Vec<RawSocket>> {
            self.0
                .clone()
                .ok_or_else(|| InventoryError::outage("test-sockets", "netlink unavailable"))
        }
    }

    #[derive(Default)]
    struct Processes {
        table: HashMap<i32, (String, String)>,
        hang: Option<Duration>,
    }

    impl Processes {
        fn with(mut self, pid: i32, name: &str, exe: &str) -> Self {
            self.table.insert(pid, (name.into(), exe.into()));
            self
        }
    }

    impl ProcessProvider for Processes {
        fn process_name(&self, pid: i32) -> portwatch_inventory::Result<String> {
            if let Some(d) = self.hang {
                std::thread::sleep(d);
            }
            self.table
                .get(&pid)
                .map(|(n, _)| n.clone())
                .ok_or_else(|| InventoryError::Gone(format!("/proc/{pid}")))
        }

        fn executable_path(&self, pid: i32) -> portwatch_inventory::Result<String> {
            if let Some(d) = self.hang {
                std::thread::sleep(d);
            }
            self.table
                .get(&pid)
                .map(|(_, e)| e.clone())
                .ok_or_else(|| InventoryError::Gone(format!("/proc/{pid}")))
        }
    }

    enum Containers {
        List(Vec<ContainerRecord>),
        Down,
        Hang,
    }

    #[async_trait]
    impl ContainerProvider for Containers {
        fn name(&self) -> &'static str {
            "test-docker"
        }

        async fn containers(&self) -> portwatch_inventory::Result<Vec<ContainerRecord>> {
            match self {
                Self::List(list) => Ok(list.clone()),
                Self::Down => Err(InventoryError::outage("test-docker", "socket not found")),
                Self::Hang => std::future::pending().await,
            }
        }
    }

    /// (cycle, endpoints, containers, verdicts) per persist call.
    type Persisted = Arc<Mutex<Vec<(u64, usize, usize, usize)>>>;

    struct RecordingSink(Persisted);

    #[async_trait]
    impl ReportSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn persist(&self, snapshot: &ScanSnapshot, verdicts: &[Verdict]) -> crate::Result<()> {
            self.0.lock().unwrap().push((
                snapshot.cycle_id().get(),
                snapshot.endpoints().len(),
                snapshot.containers().len(),
                verdicts.len(),
            ));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn persist(&self, _: &ScanSnapshot, _: &[Verdict]) -> crate::Result<()> {
            Err(AgentError::Report("read-only filesystem".into()))
        }
    }

    struct Harness {
        scheduler: CycleScheduler,
        defender: LocalInbox,
        persisted: Persisted,
    }

    fn harness(inventory: InventoryAdapter, rules: RuleSet, settings: SchedulerSettings) -> Harness {
        let mut builder = LocalBus::builder();
        let defender = builder.register(addr("defender@localhost"));
        let bus = builder.build();

        let dispatcher =
            AlertDispatcher::new(addr("monitor2@localhost"), addr("defender@localhost"), Arc::new(bus));
        let persisted = Persisted::default();
        let scheduler = CycleScheduler::new(
            addr("monitor2@localhost"),
            inventory,
            AnomalyClassifier::new(rules),
            dispatcher,
            settings,
        )
        .with_sink(Box::new(RecordingSink(Arc::clone(&persisted))));

        Harness {
            scheduler,
            defender,
            persisted,
        }
    }

    fn host_inventory(sockets: Option<Vec<RawSocket>>, processes: Processes) -> InventoryAdapter {
        InventoryAdapter::new(Attributor::with_timeout(Arc::new(processes), Duration::from_secs(3)))
            .with_endpoints(Arc::new(Sockets(sockets)))
    }

    fn container_inventory(containers: Containers) -> InventoryAdapter {
        InventoryAdapter::new(Attributor::new(Arc::new(Processes::default())))
            .with_containers(Arc::new(containers))
    }

    fn settings(idle_secs: u64) -> SchedulerSettings {
        SchedulerSettings {
            idle: Duration::from_secs(idle_secs),
            stop_grace: Duration::from_secs(5),
        }
    }

    fn builder_container() -> ContainerRecord {
        ContainerRecord::new(
            "0123456789abcdef",
            "/builder",
            "running",
            Some("unknown/unknown-builder:latest"),
        )
    }

    #[test]
    fn test_transitions_are_total() {
        let mut state = CycleState::Scan;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(state);
            state = state.next();
        }
        assert_eq!(state, CycleState::Scan);
        assert_eq!(
            seen,
            vec![CycleState::Scan, CycleState::Analyse, CycleState::ReportAlert, CycleState::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_order_and_cycle_ids() {
        let mut h = harness(
            container_inventory(Containers::List(Vec::new())),
            RuleSet::default_container_rules(),
            settings(3),
        );

        let mut transitions = Vec::new();
        for _ in 0..5 {
            match h.scheduler.tick().await {
                TickOutcome::Advanced { from, to, cycle_id } => {
                    transitions.push((from, to, cycle_id.map(CycleId::get)));
                }
                TickOutcome::Halted { .. } => panic!("unexpected halt"),
            }
        }

        assert_eq!(
            transitions,
            vec![
                (CycleState::Scan, CycleState::Analyse, Some(1)),
                (CycleState::Analyse, CycleState::ReportAlert, Some(1)),
                (CycleState::ReportAlert, CycleState::Idle, Some(1)),
                (CycleState::Idle, CycleState::Scan, Some(1)),
                (CycleState::Scan, CycleState::Analyse, Some(2)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_configured_duration() {
        let mut h = harness(
            container_inventory(Containers::List(Vec::new())),
            RuleSet::default_container_rules(),
            settings(30),
        );
        h.scheduler.run_until_idle().await.unwrap();

        let start = tokio::time::Instant::now();
        h.scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(h.scheduler.state(), CycleState::Scan);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_host_sends_no_alert() {
        let mut h = harness(
            host_inventory(
                Some(vec![RawSocket::listening("0.0.0.0:22".parse().unwrap(), Protocol::Tcp, Some(101))]),
                Processes::default().with(101, "sshd", "/usr/sbin/sshd"),
            ),
            RuleSet::from_keywords(["malware"]),
            settings(30),
        );

        let ctx = h.scheduler.run_until_idle().await.unwrap();
        assert_eq!(ctx.snapshot().endpoints().len(), 1);
        assert_eq!(ctx.snapshot().resolved_count(), 1);
        assert!(ctx.verdicts().is_empty());
        assert!(ctx.alert().is_none());

        assert!(h.defender.receive(Duration::from_secs(1)).await.unwrap().is_none());
        assert_eq!(*h.persisted.lock().unwrap(), vec![(1, 1, 0, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_container_alerts_once_per_cycle() {
        let mut h = harness(
            container_inventory(Containers::List(vec![builder_container()])),
            RuleSet::from_keywords(["unknown", "malware"]),
            settings(3),
        );

        let ctx = h.scheduler.run_until_idle().await.unwrap();
        assert_eq!(ctx.verdicts().len(), 1);
        assert_eq!(ctx.verdicts()[0].matched_rule, "unknown");
        assert_eq!(ctx.alert().unwrap().cycle_id(), CycleId::FIRST);

        let msg = h.defender.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        match MessageBody::decode(&msg.body).unwrap().body {
            MessageBody::ScanAlert(alert) => {
                assert_eq!(alert.cycle_id, CycleId::FIRST);
                assert_eq!(alert.verdicts.len(), 1);
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert!(h.defender.receive(Duration::from_secs(1)).await.unwrap().is_none());

        // The same container next cycle is a new, independent alert.
        h.scheduler.tick().await;
        h.scheduler.run_until_idle().await.unwrap();
        let msg = h.defender.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        match MessageBody::decode(&msg.body).unwrap().body {
            MessageBody::ScanAlert(alert) => assert_eq!(alert.cycle_id, CycleId::new(2)),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_attribution_timeout_does_not_block_cycle() {
        let processes = Processes {
            hang: Some(Duration::from_millis(300)),
            ..Processes::default()
        }
        .with(202, "slow", "/usr/bin/slow");
        let inventory = InventoryAdapter::new(Attributor::with_timeout(
            Arc::new(processes),
            Duration::from_millis(50),
        ))
        .with_endpoints(Arc::new(Sockets(Some(vec![RawSocket::listening(
            "0.0.0.0:8080".parse().unwrap(),
            Protocol::Tcp,
            Some(202),
        )]))));
        let mut h = harness(
            inventory,
            RuleSet::default_host_rules(),
            SchedulerSettings {
                idle: Duration::from_millis(100),
                stop_grace: Duration::from_secs(1),
            },
        );

        let start = std::time::Instant::now();
        let ctx = h.scheduler.run_until_idle().await.unwrap();
        let process = ctx.snapshot().endpoints()[0].process.as_ref().unwrap();
        assert!(!process.resolved());
        assert_eq!(process.name_lookup().to_string(), "unresolved");
        assert!(start.elapsed() < Duration::from_millis(250));

        assert!(matches!(h.scheduler.tick().await, TickOutcome::Advanced { to: CycleState::Scan, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_persists_empty_snapshot_and_continues() {
        let inventory = host_inventory(None, Processes::default())
            .with_containers(Arc::new(Containers::Down));
        let mut h = harness(inventory, RuleSet::default_host_rules(), settings(30));

        let ctx = h.scheduler.run_until_idle().await.unwrap();
        assert!(ctx.snapshot().is_empty());
        assert_eq!(ctx.snapshot().degraded().len(), 2);
        assert!(ctx.verdicts().is_empty());

        h.scheduler.tick().await;
        h.scheduler.run_until_idle().await.unwrap();
        assert_eq!(*h.persisted.lock().unwrap(), vec![(1, 0, 0, 0), (2, 0, 0, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_stop_cycle() {
        let mut h = harness(
            container_inventory(Containers::List(vec![builder_container()])),
            RuleSet::default_container_rules(),
            settings(3),
        );
        h.scheduler = h.scheduler.with_sink(Box::new(FailingSink));

        assert!(h.scheduler.run_until_idle().await.is_some());
        assert_eq!(h.scheduler.state(), CycleState::Idle);
        assert_eq!(h.persisted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_runs_nothing() {
        let mut h = harness(
            container_inventory(Containers::List(Vec::new())),
            RuleSet::default_container_rules(),
            settings(3),
        );
        h.scheduler.shutdown_token().cancel();

        assert_eq!(h.scheduler.run().await, CycleState::Scan);
        assert!(h.scheduler.context().is_none());
        assert!(h.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_idle_halts_without_new_cycle() {
        let h = harness(
            container_inventory(Containers::List(Vec::new())),
            RuleSet::default_container_rules(),
            settings(30),
        );
        let token = CancellationToken::new();
        let mut scheduler = h.scheduler.with_shutdown(token.clone());
        let persisted = h.persisted;

        let handle = tokio::spawn(async move {
            let state = scheduler.run().await;
            (state, scheduler)
        });

        tokio::time::sleep(Duration::from_secs(45)).await;
        token.cancel();
        let (state, scheduler) = handle.await.unwrap();

        assert_eq!(state, CycleState::Idle);
        assert_eq!(scheduler.context().unwrap().cycle_id(), CycleId::new(2));
        assert_eq!(persisted.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_hung_scan_after_grace() {
        let h = harness(
            container_inventory(Containers::Hang),
            RuleSet::default_container_rules(),
            settings(3),
        );
        let token = CancellationToken::new();
        let mut scheduler = h.scheduler.with_shutdown(token.clone());

        let handle = tokio::spawn(async move { scheduler.run().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stopped_at = tokio::time::Instant::now();
        token.cancel();

        assert_eq!(handle.await.unwrap(), CycleState::Scan);
        assert!(stopped_at.elapsed() <= Duration::from_secs(5));
    }
}

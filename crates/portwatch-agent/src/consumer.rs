//! Reactive agents on the receiving end of alerts.
//!
//! Both consumers poll their inbox with a bounded timeout; a timeout is "no
//! alert this poll". Only a closed inbox ends their loop.

use portwatch_core::{AgentAddress, MessageBody, Performative, WIRE_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::transport::{Inbox, RawMessage, Transport};

/// Default monitor receive timeout.
pub const MONITOR_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default defender receive timeout.
pub const DEFENDER_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

const ATTACK_MARKER: &str = "attack";

/// Decode a body; bodies that are not a wire envelope are treated as text.
fn decode_body(raw: &RawMessage) -> MessageBody {
    match MessageBody::decode(&raw.body) {
        Ok(wire) => {
            if wire.v > WIRE_VERSION {
                debug!(v = wire.v, from = %raw.sender, "message from newer sender");
            }
            wire.body
        }
        Err(_) => MessageBody::Text {
            text: raw.body.clone(),
        },
    }
}

async fn poll_inbox(
    inbox: &mut dyn Inbox,
    timeout: Duration,
) -> Result<Option<RawMessage>, TransportError> {
    let received = inbox.receive(timeout).await?;
    if received.is_none() {
        debug!(agent = %inbox.address(), "no alert this poll");
    }
    Ok(received)
}

/// Relays alerts to the defender.
///
/// Scan alerts are forwarded unchanged; free-text notices only when they
/// mention an attack.
pub struct MonitorConsumer {
    inbox: Box<dyn Inbox>,
    defender: AgentAddress,
    transport: Arc<dyn Transport>,
    receive_timeout: Duration,
    relayed: u64,
}

impl MonitorConsumer {
    /// Create a monitor reading `inbox` and relaying to `defender`.
    pub fn new(inbox: Box<dyn Inbox>, defender: AgentAddress, transport: Arc<dyn Transport>) -> Self {
        Self {
            inbox,
            defender,
            transport,
            receive_timeout: MONITOR_RECEIVE_TIMEOUT,
            relayed: 0,
        }
    }

    /// Set the receive timeout.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Messages relayed so far.
    #[must_use]
    pub const fn relayed(&self) -> u64 {
        self.relayed
    }

    /// Wait for one message and relay it if it qualifies.
    ///
    /// Returns the decoded body, or `None` on timeout.
    pub async fn poll(&mut self) -> Result<Option<MessageBody>, TransportError> {
        let Some(raw) = poll_inbox(self.inbox.as_mut(), self.receive_timeout).await? else {
            return Ok(None);
        };
        let body = decode_body(&raw);

        let relay = match &body {
            MessageBody::ScanAlert(alert) => {
                info!(from = %raw.sender, cycle_id = %alert.cycle_id, "scan alert received");
                Some(body.clone())
            }
            MessageBody::Text { text } if text.to_lowercase().contains(ATTACK_MARKER) => {
                info!(from = %raw.sender, "attack notice received");
                Some(MessageBody::Text {
                    text: format!("Attack discovered: {text}"),
                })
            }
            MessageBody::Text { .. } => {
                debug!(from = %raw.sender, "notice ignored");
                None
            }
            MessageBody::Unknown => {
                debug!(from = %raw.sender, "unknown message kind ignored");
                None
            }
        };

        if let Some(out) = relay {
            self.forward(&out).await;
        }
        Ok(Some(body))
    }

    async fn forward(&mut self, body: &MessageBody) {
        let encoded = match body.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "relay encode failed");
                return;
            }
        };
        let message = RawMessage {
            sender: self.inbox.address().clone(),
            recipient: self.defender.clone(),
            performative: Performative::Inform,
            body: encoded,
        };
        match self.transport.send(message).await {
            Ok(()) => {
                self.relayed += 1;
                info!(to = %self.defender, "relayed to defender");
            }
            Err(e) => warn!(to = %self.defender, error = %e, "relay failed"),
        }
    }

    /// Poll until stopped or the inbox closes.
    #[instrument(skip_all, fields(agent = %self.inbox.address()))]
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(defender = %self.defender, "monitor started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.poll() => {
                    if let Err(e) = polled {
                        warn!(error = %e, "monitor inbox closed");
                        break;
                    }
                }
            }
        }
        info!(relayed = self.relayed, "monitor stopped");
    }
}

impl std::fmt::Debug for MonitorConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConsumer")
            .field("address", self.inbox.address())
            .field("defender", &self.defender)
            .field("receive_timeout", &self.receive_timeout)
            .field("relayed", &self.relayed)
            .finish_non_exhaustive()
    }
}

/// What the defender has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefenderStats {
    /// Scan alerts acted on
    pub alerts: u64,
    /// Free-text notices acted on
    pub notices: u64,
    /// Messages of unknown kind
    pub ignored: u64,
}

/// Triggers the local response for each alert it receives.
pub struct DefenderConsumer {
    inbox: Box<dyn Inbox>,
    receive_timeout: Duration,
    stats: DefenderStats,
}

impl DefenderConsumer {
    /// Create a defender reading `inbox`.
    pub fn new(inbox: Box<dyn Inbox>) -> Self {
        Self {
            inbox,
            receive_timeout: DEFENDER_RECEIVE_TIMEOUT,
            stats: DefenderStats::default(),
        }
    }

    /// Set the receive timeout.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> DefenderStats {
        self.stats
    }

    /// Wait for one message and act on it.
    pub async fn poll(&mut self) -> Result<Option<MessageBody>, TransportError> {
        let Some(raw) = poll_inbox(self.inbox.as_mut(), self.receive_timeout).await? else {
            return Ok(None);
        };
        let body = decode_body(&raw);

        match &body {
            MessageBody::ScanAlert(alert) => {
                self.stats.alerts += 1;
                warn!(
                    from = %raw.sender,
                    cycle_id = %alert.cycle_id,
                    verdicts = alert.verdicts.len(),
                    summary = %alert.summary,
                    "response triggered"
                );
                for verdict in &alert.verdicts {
                    info!(from = %raw.sender, "{verdict}");
                }
            }
            MessageBody::Text { text } => {
                self.stats.notices += 1;
                warn!(from = %raw.sender, notice = %text, "response triggered");
            }
            MessageBody::Unknown => {
                self.stats.ignored += 1;
                debug!(from = %raw.sender, "unknown message kind ignored");
            }
        }
        Ok(Some(body))
    }

    /// Poll until stopped or the inbox closes.
    #[instrument(skip_all, fields(agent = %self.inbox.address()))]
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("defender started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.poll() => {
                    if let Err(e) = polled {
                        warn!(error = %e, "defender inbox closed");
                        break;
                    }
                }
            }
        }
        info!(alerts = self.stats.alerts, notices = self.stats.notices, "defender stopped");
    }
}

impl std::fmt::Debug for DefenderConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefenderConsumer")
            .field("address", self.inbox.address())
            .field("receive_timeout", &self.receive_timeout)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::verdict;
    use crate::transport::{LocalBus, LocalInbox};
    use portwatch_core::{AlertMessage, CycleId};

    fn addr(s: &str) -> AgentAddress {
        s.parse().unwrap()
    }

    fn raw(to: &str, body: String) -> RawMessage {
        RawMessage {
            sender: addr("monitor2@localhost"),
            recipient: addr(to),
            performative: Performative::Inform,
            body,
        }
    }

    fn alert_body(cycle: u64) -> String {
        AlertMessage::from_verdicts(
            CycleId::new(cycle),
            addr("monitor2@localhost"),
            addr("monitor@localhost"),
            &[verdict("unknown")],
        )
        .unwrap()
        .to_body()
        .encode()
        .unwrap()
    }

    fn setup() -> (LocalBus, LocalInbox, LocalInbox) {
        let mut builder = LocalBus::builder();
        let monitor = builder.register(addr("monitor@localhost"));
        let defender = builder.register(addr("defender@localhost"));
        (builder.build(), monitor, defender)
    }

    #[tokio::test]
    async fn test_monitor_relays_scan_alert() {
        let (bus, monitor_inbox, mut defender_inbox) = setup();
        let mut monitor =
            MonitorConsumer::new(Box::new(monitor_inbox), addr("defender@localhost"), Arc::new(bus.clone()));

        bus.send(raw("monitor@localhost", alert_body(4))).await.unwrap();
        let body = monitor.poll().await.unwrap().unwrap();
        assert!(matches!(body, MessageBody::ScanAlert(_)));
        assert_eq!(monitor.relayed(), 1);

        let relayed = defender_inbox.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(relayed.sender, addr("monitor@localhost"));
        assert_eq!(MessageBody::decode(&relayed.body).unwrap().body, body);
    }

    #[tokio::test]
    async fn test_monitor_relays_only_attack_text() {
        let (bus, monitor_inbox, mut defender_inbox) = setup();
        let mut monitor =
            MonitorConsumer::new(Box::new(monitor_inbox), addr("defender@localhost"), Arc::new(bus.clone()));

        bus.send(raw("monitor@localhost", "all quiet".into())).await.unwrap();
        monitor.poll().await.unwrap();
        assert_eq!(monitor.relayed(), 0);

        bus.send(raw("monitor@localhost", "Possible ATTACK on port 22".into())).await.unwrap();
        monitor.poll().await.unwrap();
        assert_eq!(monitor.relayed(), 1);

        let relayed = defender_inbox.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(
            MessageBody::decode(&relayed.body).unwrap().body,
            MessageBody::Text {
                text: "Attack discovered: Possible ATTACK on port 22".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_no_alert() {
        let (_bus, monitor_inbox, defender_inbox) = setup();
        let mut monitor = MonitorConsumer::new(
            Box::new(monitor_inbox),
            addr("defender@localhost"),
            Arc::new(LocalBus::builder().build()),
        );
        let mut defender = DefenderConsumer::new(Box::new(defender_inbox));

        assert!(monitor.poll().await.unwrap().is_none());
        assert!(defender.poll().await.unwrap().is_none());
        assert_eq!(defender.stats(), DefenderStats::default());
    }

    #[tokio::test]
    async fn test_defender_counts_by_kind() {
        let (bus, _monitor_inbox, defender_inbox) = setup();
        let mut defender = DefenderConsumer::new(Box::new(defender_inbox));

        bus.send(raw("defender@localhost", alert_body(1))).await.unwrap();
        bus.send(raw("defender@localhost", "Attack discovered: x".into())).await.unwrap();
        bus.send(raw("defender@localhost", r#"{"v":2,"body":{"kind":"quarantine"}}"#.into()))
            .await
            .unwrap();
        for _ in 0..3 {
            defender.poll().await.unwrap().unwrap();
        }

        assert_eq!(
            defender.stats(),
            DefenderStats {
                alerts: 1,
                notices: 1,
                ignored: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (_bus, _monitor_inbox, defender_inbox) = setup();
        let mut defender = DefenderConsumer::new(Box::new(defender_inbox));
        let token = CancellationToken::new();

        let stop = token.clone();
        let handle = tokio::spawn(async move {
            defender.run(stop).await;
            defender.stats()
        });
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), DefenderStats::default());
    }
}

//! Alert construction and hand-off.

use portwatch_core::{AgentAddress, AlertMessage, CycleId, Verdict};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{RawMessage, Transport};

/// Default budget for handing an alert to the transport.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds one addressed alert per cycle from non-empty verdicts.
///
/// Sends are fire-and-forget: a failed send is logged and the cycle counts as
/// dispatched. Nothing is suppressed across cycles.
pub struct AlertDispatcher {
    sender: AgentAddress,
    recipient: AgentAddress,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    last_cycle: Option<CycleId>,
}

impl AlertDispatcher {
    /// Create a dispatcher sending as `sender` to the default `recipient`.
    pub fn new(sender: AgentAddress, recipient: AgentAddress, transport: Arc<dyn Transport>) -> Self {
        Self {
            sender,
            recipient,
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            last_cycle: None,
        }
    }

    /// Set the send budget.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Address alerts are sent from.
    #[must_use]
    pub const fn sender(&self) -> &AgentAddress {
        &self.sender
    }

    /// Default recipient.
    #[must_use]
    pub const fn recipient(&self) -> &AgentAddress {
        &self.recipient
    }

    /// Dispatch to the default recipient.
    pub async fn dispatch(&mut self, cycle_id: CycleId, verdicts: &[Verdict]) -> Option<AlertMessage> {
        let recipient = self.recipient.clone();
        self.dispatch_to(cycle_id, verdicts, recipient).await
    }

    /// Dispatch to an explicit recipient.
    ///
    /// Returns `None` without sending when `verdicts` is empty or this cycle
    /// already produced an alert.
    pub async fn dispatch_to(
        &mut self,
        cycle_id: CycleId,
        verdicts: &[Verdict],
        recipient: AgentAddress,
    ) -> Option<AlertMessage> {
        if self.last_cycle == Some(cycle_id) {
            debug!(cycle_id = %cycle_id, "alert already dispatched for cycle");
            return None;
        }

        let alert = AlertMessage::from_verdicts(cycle_id, self.sender.clone(), recipient, verdicts)?;
        self.last_cycle = Some(cycle_id);

        match self.send(&alert).await {
            Ok(()) => info!(
                cycle_id = %cycle_id,
                to = %alert.recipient(),
                verdicts = verdicts.len(),
                "alert sent"
            ),
            Err(e) => warn!(cycle_id = %cycle_id, to = %alert.recipient(), error = %e, "alert send failed"),
        }

        Some(alert)
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), TransportError> {
        let body = alert
            .to_body()
            .encode()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let message = RawMessage {
            sender: alert.sender().clone(),
            recipient: alert.recipient().clone(),
            performative: alert.performative(),
            body,
        };

        tokio::time::timeout(self.send_timeout, self.transport.send(message))
            .await
            .map_err(|_| TransportError::Timeout(self.send_timeout))?
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("send_timeout", &self.send_timeout)
            .field("last_cycle", &self.last_cycle)
            .finish_non_exhaustive()
    }
}

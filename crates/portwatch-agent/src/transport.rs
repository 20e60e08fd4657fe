//! Addressed message transport.
//!
//! The transport moves opaque bodies between agent addresses; it knows nothing
//! about alerts. [`LocalBus`] is the in-process implementation used when all
//! agents run in one process.

use async_trait::async_trait;
use portwatch_core::{AgentAddress, Performative};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// A message as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Sending agent
    pub sender: AgentAddress,
    /// Receiving agent
    pub recipient: AgentAddress,
    /// Speech-act tag
    pub performative: Performative,
    /// Encoded body
    pub body: String,
}

/// Outbound side of the transport.
///
/// `send` returns once the message is accepted for delivery; it never waits
/// for the recipient to read it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand a message to the transport.
    async fn send(&self, message: RawMessage) -> Result<(), TransportError>;
}

/// Inbound side of the transport, owned by one agent.
#[async_trait]
pub trait Inbox: Send {
    /// Address this inbox receives for.
    fn address(&self) -> &AgentAddress;

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived this poll. An error means the inbox
    /// can never receive again.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>, TransportError>;
}

/// Registers agents before the bus is shared.
#[derive(Debug, Default)]
pub struct LocalBusBuilder {
    routes: HashMap<AgentAddress, mpsc::UnboundedSender<RawMessage>>,
}

impl LocalBusBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address and get its inbox. Re-registering replaces the old inbox.
    pub fn register(&mut self, address: AgentAddress) -> LocalInbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(address.clone(), tx);
        LocalInbox { address, rx }
    }

    /// Freeze the routing table.
    #[must_use]
    pub fn build(self) -> LocalBus {
        LocalBus {
            routes: Arc::new(self.routes),
        }
    }
}

/// In-process bus with a fixed routing table.
///
/// Cloning is cheap; the routing table is immutable once built.
#[derive(Debug, Clone)]
pub struct LocalBus {
    routes: Arc<HashMap<AgentAddress, mpsc::UnboundedSender<RawMessage>>>,
}

impl LocalBus {
    /// Start registering agents.
    #[must_use]
    pub fn builder() -> LocalBusBuilder {
        LocalBusBuilder::new()
    }

    /// Returns true if the address has an inbox.
    #[must_use]
    pub fn is_registered(&self, address: &AgentAddress) -> bool {
        self.routes.contains_key(address)
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn send(&self, message: RawMessage) -> Result<(), TransportError> {
        let route = self
            .routes
            .get(&message.recipient)
            .ok_or_else(|| TransportError::UnknownRecipient(message.recipient.clone()))?;

        let recipient = message.recipient.clone();
        debug!(from = %message.sender, to = %recipient, performative = %message.performative, "bus send");
        route
            .send(message)
            .map_err(|_| TransportError::Closed(recipient))
    }
}

/// Inbox handed out by [`LocalBusBuilder::register`].
#[derive(Debug)]
pub struct LocalInbox {
    address: AgentAddress,
    rx: mpsc::UnboundedReceiver<RawMessage>,
}

#[async_trait]
impl Inbox for LocalInbox {
    fn address(&self) -> &AgentAddress {
        &self.address
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>, TransportError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(TransportError::Closed(self.address.clone())),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> AgentAddress {
        s.parse().unwrap()
    }

    fn message(to: &str, body: &str) -> RawMessage {
        RawMessage {
            sender: addr("scanner@localhost"),
            recipient: addr(to),
            performative: Performative::Inform,
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn test_delivery_to_registered_inbox() {
        let mut builder = LocalBus::builder();
        let mut inbox = builder.register(addr("defender@localhost"));
        let bus = builder.build();

        tokio_test::assert_ok!(bus.send(message("defender@localhost", "hello")).await);
        let got = inbox.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(got.body, "hello");
        assert_eq!(got.sender.to_string(), "scanner@localhost");
    }

    #[tokio::test]
    async fn test_unknown_recipient() {
        let bus = LocalBus::builder().build();
        let err = bus.send(message("nobody@localhost", "x")).await.unwrap_err();
        assert_eq!(err, TransportError::UnknownRecipient(addr("nobody@localhost")));
    }

    #[tokio::test]
    async fn test_closed_inbox() {
        let mut builder = LocalBus::builder();
        let inbox = builder.register(addr("defender@localhost"));
        let bus = builder.build();
        drop(inbox);

        let err = bus.send(message("defender@localhost", "x")).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_timeout_is_not_an_error() {
        let mut builder = LocalBus::builder();
        let mut inbox = builder.register(addr("monitor@localhost"));
        let _bus = builder.build();

        let got = inbox.receive(Duration::from_secs(5)).await.unwrap();
        assert!(got.is_none());
    }
}

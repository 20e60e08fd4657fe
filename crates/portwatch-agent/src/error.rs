//! Error types for portwatch agents.

use portwatch_core::{AgentAddress, CoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in agent operations.
///
/// None of these stop a running scheduler; they are logged where they occur.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Message could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Report could not be written.
    #[error("report error: {0}")]
    Report(String),

    /// Wire encoding or configuration failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the message transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No agent is registered under this address.
    #[error("no agent registered at {0}")]
    UnknownRecipient(AgentAddress),

    /// The recipient's inbox (or our own) is closed.
    #[error("mailbox closed: {0}")]
    Closed(AgentAddress),

    /// Body could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The send did not complete within its budget.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

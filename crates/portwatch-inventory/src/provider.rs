//! Provider seams between the inventory and the host.
//!
//! Socket and process lookups are blocking OS calls and are modelled as plain
//! traits; the adapter moves them onto blocking workers. The container engine
//! is reached over an async API.

use async_trait::async_trait;
use portwatch_core::{ContainerRecord, Protocol};
use std::net::SocketAddr;

use crate::error::Result;

/// A socket as reported by the OS, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocket {
    /// Local address, if the OS reported one
    pub local: Option<SocketAddr>,
    /// Transport protocol
    pub protocol: Protocol,
    /// Whether the socket is accepting connections / datagrams
    pub listening: bool,
    /// Owning process, when it could be determined
    pub pid: Option<i32>,
}

impl RawSocket {
    /// A listening socket
    #[must_use]
    pub const fn listening(local: SocketAddr, protocol: Protocol, pid: Option<i32>) -> Self {
        Self {
            local: Some(local),
            protocol,
            listening: true,
            pid,
        }
    }
}

/// Enumerates the host's inet sockets (blocking).
pub trait EndpointProvider: Send + Sync + 'static {
    /// Provider name used in logs and degradation records
    fn name(&self) -> &'static str;

    /// All inet sockets visible to the caller; filtering happens in the adapter
    fn sockets(&self) -> Result<Vec<RawSocket>>;
}

/// Reads per-process metadata (blocking; may fail or hang).
pub trait ProcessProvider: Send + Sync + 'static {
    /// Short process name (comm)
    fn process_name(&self, pid: i32) -> Result<String>;

    /// Absolute path of the executable
    fn executable_path(&self, pid: i32) -> Result<String>;
}

/// Lists containers from the local container engine.
#[async_trait]
pub trait ContainerProvider: Send + Sync + 'static {
    /// Provider name used in logs and degradation records
    fn name(&self) -> &'static str;

    /// All containers, running or not
    async fn containers(&self) -> Result<Vec<ContainerRecord>>;
}

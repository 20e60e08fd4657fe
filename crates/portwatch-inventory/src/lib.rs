//! # portwatch-inventory
//!
//! Collects the raw material for one scan cycle: listening sockets, the
//! processes that own them, and the containers known to the local engine.
//!
//! ## Data Flow
//!
//! ```text
//! EndpointProvider (procfs)        ContainerProvider (docker)
//!   -> keep listening sockets        -> short ids, image tags
//!   -> Attributor::resolve(pid)      |
//!   -> VersionProbe (optional)       |
//!   \________________________________/
//!                   |
//!            InventoryAdapter::collect -> ScanSnapshot
//! ```
//!
//! Every OS call runs on a blocking worker under a timeout. A failed lookup
//! degrades one subject; a failed provider degrades the snapshot. Neither is
//! ever returned to the caller as an error.

pub mod adapter;
pub mod attributor;
pub mod discovery;
pub mod error;
pub mod provider;
pub mod version;

pub use adapter::InventoryAdapter;
pub use attributor::Attributor;
pub use error::{InventoryError, Result};
pub use provider::{ContainerProvider, EndpointProvider, ProcessProvider, RawSocket};
pub use version::VersionProbe;

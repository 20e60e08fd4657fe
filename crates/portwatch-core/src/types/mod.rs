//! Data model shared across the inventory, classifier, and dispatcher.

mod container;
mod endpoint;
mod message;
mod snapshot;
mod verdict;

pub use container::{ContainerRecord, SHORT_ID_LEN, UNKNOWN_IMAGE};
pub use endpoint::{Lookup, ProcessAttribution, Protocol, ServiceEndpoint, UnresolvedReason};
pub use message::{
    AgentAddress, AlertMessage, AlertPayload, MessageBody, Performative, ScanAlert, WireMessage,
    WIRE_VERSION,
};
pub use snapshot::{CycleId, Degradation, ObservedEndpoint, ScanSnapshot};
pub use verdict::{Severity, SubjectRef, Verdict};

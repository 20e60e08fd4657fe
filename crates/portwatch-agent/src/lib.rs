//! portwatch-agent: the per-agent scan cycle and the alert hand-off.
//!
//! # Architecture
//!
//! Each scanning agent owns one [`CycleScheduler`], a closed state machine:
//!
//! ```text
//! SCAN -> ANALYSE -> REPORT_ALERT -> IDLE -> SCAN ...
//!  |         |            |            |
//!  |         |            |            +- cancellable timer
//!  |         |            +- AlertDispatcher (non-empty verdicts), ReportSink(s)
//!  |         +- AnomalyClassifier
//!  +- InventoryAdapter (new cycle id)
//! ```
//!
//! Alerts travel as addressed `inform` messages over a [`Transport`]; the
//! [`MonitorConsumer`] and [`DefenderConsumer`] poll their inboxes with a
//! bounded receive timeout.

pub mod classifier;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod transport;

pub use classifier::{classify, AnomalyClassifier};
pub use consumer::{DefenderConsumer, DefenderStats, MonitorConsumer};
pub use dispatcher::AlertDispatcher;
pub use error::{AgentError, TransportError};
pub use report::{JsonFileSink, LogReportSink, ReportSink};
pub use scheduler::{CycleContext, CycleScheduler, CycleState, SchedulerSettings, TickOutcome};
pub use transport::{Inbox, LocalBus, LocalBusBuilder, LocalInbox, RawMessage, Transport};

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

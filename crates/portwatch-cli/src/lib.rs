//! portwatch CLI library.
//!
//! Wires the scan agents, the monitor and the defender onto one in-process
//! bus and runs them until interrupted.

pub mod agents;
pub mod cli;
pub mod config;
pub mod logging;
pub mod output;

pub use cli::run;

//! Core types, rules, and configuration for portwatch.
//!
//! This crate provides the foundational types shared by the inventory and
//! agent crates:
//!
//! - **Types**: endpoints, process attributions, containers, snapshots,
//!   verdicts, and alert messages
//! - **Rules**: the configurable keyword/version rule set used by the classifier
//! - **Config**: the TOML configuration surface with startup validation
//! - **Errors**: [`CoreError`] for configuration and wire-format failures
//!
//! # Example
//!
//! ```rust,ignore
//! use portwatch_core::{MonitorConfig, RuleSet};
//!
//! let config = MonitorConfig::load(path)?;
//! config.validate()?;
//! println!("{} container rules", config.container_scan.rules.len());
//! ```

mod error;
pub mod config;
pub mod rules;
pub mod types;

pub use config::MonitorConfig;
pub use error::{CoreError, Result};
pub use rules::{MatchField, Rule, RuleScope, RuleSet};
pub use types::*;

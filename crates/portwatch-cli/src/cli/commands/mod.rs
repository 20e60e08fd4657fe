//! Command implementations.

pub mod config;
pub mod run;
pub mod scan;

use std::path::PathBuf;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit `--config` path, if given
    pub config_path: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,
}

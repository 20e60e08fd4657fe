//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Host and container monitoring agents
///
/// Scans listening services and containers on a fixed cadence, classifies
/// them against keyword rules, and alerts the defender agent.
#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, env = "PORTWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for one-shot results
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run all enabled agents until interrupted
    Run(RunArgs),

    /// Take one snapshot and classify it without alerting
    Scan(ScanArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

// ============================================================================
// Run command
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Alert recipient address (name@domain)
    #[arg(long)]
    pub recipient: Option<String>,

    /// Seconds between host scan cycles
    #[arg(long, value_name = "SECS")]
    pub host_idle: Option<u64>,

    /// Seconds between container scan cycles
    #[arg(long, value_name = "SECS")]
    pub container_idle: Option<u64>,

    /// Disable the host scan agent
    #[arg(long)]
    pub no_host: bool,

    /// Disable the container scan agent
    #[arg(long)]
    pub no_containers: bool,

    /// Run a single cycle per agent, deliver alerts, and exit
    #[arg(long)]
    pub once: bool,
}

// ============================================================================
// Scan command
// ============================================================================

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// What to inventory
    #[arg(value_enum, default_value_t = ScanTarget::All)]
    pub target: ScanTarget,

    /// Probe executables for version strings
    #[arg(long)]
    pub versions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanTarget {
    /// Listening sockets and their processes
    Host,
    /// Containers from the local engine
    Containers,
    /// Both
    All,
}

impl ScanTarget {
    pub const fn host(self) -> bool {
        matches!(self, Self::Host | Self::All)
    }

    pub const fn containers(self) -> bool {
        matches!(self, Self::Containers | Self::All)
    }
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::parse_from([
            "portwatch",
            "run",
            "--recipient",
            "monitor@localhost",
            "--host-idle",
            "10",
            "--once",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.recipient.as_deref(), Some("monitor@localhost"));
                assert_eq!(args.host_idle, Some(10));
                assert!(args.once);
                assert!(!args.no_host);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_scan_target_default() {
        let cli = Cli::parse_from(["portwatch", "scan"]);
        match cli.command {
            Commands::Scan(args) => assert_eq!(args.target, ScanTarget::All),
            other => panic!("unexpected command {other:?}"),
        }
    }
}

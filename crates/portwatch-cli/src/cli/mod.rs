//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    crate::logging::init(cli.verbose);

    let ctx = commands::Context {
        config_path: cli.config,
        output_format: cli.output,
    };

    match cli.command {
        Commands::Run(args) => commands::run::execute(ctx, args).await,
        Commands::Scan(args) => commands::scan::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(&ctx, args),
    }
}

//! `portwatch config` - configuration file management.

use anyhow::{Context as _, Result};
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config;
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Path => show_path(ctx),
        ConfigCommands::Init { force } => init_config(ctx, force),
        ConfigCommands::Check => check_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let (path, config) = config::load(ctx.config_path.as_deref())?;

    match ctx.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Pretty => {
            let source = if path.exists() {
                path.display().to_string()
            } else {
                format!("{} (not found, using defaults)", path.display())
            };
            println!("{} {}", "# Source:".dimmed(), source.dimmed());
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    let path = config::resolve_path(ctx.config_path.as_deref())?;
    println!("{}", path.display());
    Ok(())
}

fn init_config(ctx: &Context, force: bool) -> Result<()> {
    let path = config::resolve_path(ctx.config_path.as_deref())?;
    config::init(&path, force)?;
    println!("{} wrote {}", "Success:".green().bold(), path.display());
    Ok(())
}

fn check_config(ctx: &Context) -> Result<()> {
    let (path, config) = config::load(ctx.config_path.as_deref())?;
    let addrs = config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    println!(
        "{} {} (alerts to {})",
        "Valid:".green().bold(),
        path.display(),
        addrs.alert_recipient
    );
    Ok(())
}

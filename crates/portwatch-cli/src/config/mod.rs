//! Configuration file location, loading, and command-line overrides.

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use portwatch_core::MonitorConfig;
use std::path::{Path, PathBuf};

use crate::cli::args::RunArgs;

/// Default config file path.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("io", "portwatch", "portwatch")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join("config.toml"))
}

/// The explicit path, or the default one.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    explicit.map_or_else(default_path, |p| Ok(p.to_path_buf()))
}

/// Load the config file. A missing file yields defaults.
pub fn load(explicit: Option<&Path>) -> Result<(PathBuf, MonitorConfig)> {
    let path = resolve_path(explicit)?;
    let config = MonitorConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok((path, config))
}

/// Write the default config. Refuses to overwrite unless `force`.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = MonitorConfig::default().to_toml()?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Apply `run` flags on top of the file values.
pub fn apply_overrides(config: &mut MonitorConfig, args: &RunArgs) {
    if let Some(recipient) = &args.recipient {
        config.agents.alert_recipient.clone_from(recipient);
    }
    if let Some(secs) = args.host_idle {
        config.host_scan.idle_secs = secs;
    }
    if let Some(secs) = args.container_idle {
        config.container_scan.idle_secs = secs;
    }
    if args.no_host {
        config.host_scan.enabled = false;
    }
    if args.no_containers {
        config.container_scan.enabled = false;
    }
}

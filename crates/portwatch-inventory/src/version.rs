//! Executable version probing (`--version`, `-v`, `-V`).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Flags tried in order until one prints something version-like.
pub const VERSION_FLAGS: [&str; 3] = ["--version", "-v", "-V"];

/// Default per-flag budget.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs an executable with common version flags and captures the first
/// output line that contains a digit.
#[derive(Debug, Clone, Copy)]
pub struct VersionProbe {
    timeout: Duration,
}

impl Default for VersionProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl VersionProbe {
    /// Create a probe with a per-flag budget.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probe an executable. Any failure yields `None`.
    pub async fn probe(&self, exe: &Path) -> Option<String> {
        for flag in VERSION_FLAGS {
            let mut cmd = Command::new(exe);
            cmd.arg(flag)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            match tokio::time::timeout(self.timeout, cmd.output()).await {
                Ok(Ok(output)) => {
                    if let Some(line) =
                        version_line(&output.stdout).or_else(|| version_line(&output.stderr))
                    {
                        return Some(line);
                    }
                }
                Ok(Err(e)) => {
                    // Not executable by us; other flags will fail the same way.
                    debug!(exe = %exe.display(), error = %e, "version probe could not spawn");
                    return None;
                }
                Err(_) => {
                    debug!(exe = %exe.display(), flag, "version probe timed out");
                }
            }
        }
        None
    }
}

/// First non-empty line containing an ASCII digit.
fn version_line(raw: &[u8]) -> Option<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && l.bytes().any(|b| b.is_ascii_digit()))
        .map(ToString::to_string)
}

//! Best-effort pid -> process identity resolution.

use portwatch_core::{Lookup, ProcessAttribution, UnresolvedReason};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::InventoryError;
use crate::provider::ProcessProvider;

/// Default per-lookup budget.
pub const DEFAULT_ATTRIBUTION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
enum Field {
    Name,
    Executable,
}

impl Field {
    const fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Executable => "exe",
        }
    }
}

/// Resolves pids to name and executable path.
///
/// Each lookup runs on its own blocking worker under `timeout`, so a hung or
/// denied read of one field never delays the other field or the next pid.
pub struct Attributor {
    provider: Arc<dyn ProcessProvider>,
    timeout: Duration,
    permission_warned: AtomicBool,
}

impl Attributor {
    /// Create an attributor with the default budget.
    pub fn new(provider: Arc<dyn ProcessProvider>) -> Self {
        Self::with_timeout(provider, DEFAULT_ATTRIBUTION_TIMEOUT)
    }

    /// Create an attributor with a custom per-lookup budget.
    pub fn with_timeout(provider: Arc<dyn ProcessProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            permission_warned: AtomicBool::new(false),
        }
    }

    /// Resolve one pid. Never fails; unreadable fields are `Unresolved`.
    pub async fn resolve(&self, pid: i32) -> ProcessAttribution {
        let (name, exe) = tokio::join!(
            self.lookup(pid, Field::Name),
            self.lookup(pid, Field::Executable)
        );
        ProcessAttribution::new(pid, name, exe)
    }

    async fn lookup(&self, pid: i32, field: Field) -> Lookup {
        let provider = Arc::clone(&self.provider);
        let task = tokio::task::spawn_blocking(move || match field {
            Field::Name => provider.process_name(pid),
            Field::Executable => provider.executable_path(pid),
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(value))) => Lookup::Resolved(value),
            Ok(Ok(Err(e))) => {
                self.record_failure(pid, field, &e);
                Lookup::Unresolved(e.unresolved_reason())
            }
            Ok(Err(join_err)) => {
                warn!(pid, field = field.label(), error = %join_err, "attribution worker failed");
                Lookup::Unresolved(UnresolvedReason::Unavailable)
            }
            Err(_) => {
                // The worker keeps running detached; its result is discarded.
                debug!(pid, field = field.label(), timeout = ?self.timeout, "attribution timed out");
                Lookup::Unresolved(UnresolvedReason::Timeout)
            }
        }
    }

    fn record_failure(&self, pid: i32, field: Field, err: &InventoryError) {
        if err.is_permission() && !self.permission_warned.swap(true, Ordering::Relaxed) {
            warn!(
                pid,
                field = field.label(),
                "insufficient privilege for process attribution; results will be partial (run as root for full mapping)"
            );
            return;
        }
        debug!(pid, field = field.label(), error = %err, "attribution lookup failed");
    }
}

impl std::fmt::Debug for Attributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attributor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

//! Error types for inventory providers.
//!
//! These errors never escape [`crate::InventoryAdapter::collect`]; they are
//! turned into `Unresolved` lookups or snapshot degradations there.

use portwatch_core::UnresolvedReason;
use std::time::Duration;
use thiserror::Error;

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors that can occur while querying the host.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The caller lacks privilege for this call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The call exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The process exited while it was being inspected.
    #[error("process gone: {0}")]
    Gone(String),

    /// The whole provider is unreachable.
    #[error("{provider} unavailable: {reason}")]
    Outage {
        provider: &'static str,
        reason: String,
    },

    /// Any other provider failure.
    #[error("{0}")]
    Other(String),
}

impl InventoryError {
    /// Build an outage error for a provider.
    pub fn outage(provider: &'static str, reason: impl ToString) -> Self {
        Self::Outage {
            provider,
            reason: reason.to_string(),
        }
    }

    /// Returns true for privilege failures.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true for budget overruns.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// How this failure is recorded on an attribution.
    #[must_use]
    pub const fn unresolved_reason(&self) -> UnresolvedReason {
        match self {
            Self::PermissionDenied(_) => UnresolvedReason::PermissionDenied,
            Self::Timeout(_) => UnresolvedReason::Timeout,
            Self::Gone(_) => UnresolvedReason::Gone,
            Self::Outage { .. } | Self::Other(_) => UnresolvedReason::Unavailable,
        }
    }
}

impl From<procfs::ProcError> for InventoryError {
    fn from(err: procfs::ProcError) -> Self {
        match err {
            procfs::ProcError::PermissionDenied(path) => {
                Self::PermissionDenied(path.map_or_else(String::new, |p| p.display().to_string()))
            }
            procfs::ProcError::NotFound(path) => {
                Self::Gone(path.map_or_else(String::new, |p| p.display().to_string()))
            }
            other => Self::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_reason_mapping() {
        assert_eq!(
            InventoryError::PermissionDenied("/proc/1/exe".into()).unresolved_reason(),
            UnresolvedReason::PermissionDenied
        );
        assert_eq!(
            InventoryError::Timeout(Duration::from_secs(3)).unresolved_reason(),
            UnresolvedReason::Timeout
        );
        assert_eq!(
            InventoryError::outage("docker", "socket missing").unresolved_reason(),
            UnresolvedReason::Unavailable
        );
    }

    #[test]
    fn test_outage_display() {
        let err = InventoryError::outage("docker", "connection refused");
        assert_eq!(err.to_string(), "docker unavailable: connection refused");
        assert!(!err.is_permission());
        assert!(InventoryError::Timeout(Duration::from_secs(1)).is_timeout());
    }
}

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by configuration loading and wire encoding.
///
/// Every variant here is fatal at startup; runtime degradation is modelled
/// with result types in the inventory and agent crates instead.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration is invalid or missing required fields
    #[error("configuration error: {0}")]
    Config(String),

    /// Agent address could not be parsed
    #[error("invalid agent address: {0}")]
    InvalidAddress(String),

    /// Rule set failed validation
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Config file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoreError {
    /// Returns true if the error comes from the rule set
    #[must_use]
    pub const fn is_rule_error(&self) -> bool {
        matches!(self, Self::InvalidRule(_))
    }
}

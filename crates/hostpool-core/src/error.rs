//! Error types for the capability traits and configuration.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for compute provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for session directory calls.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors reported by a compute provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("compute node not found: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("remote script failed on {node}: {message}")]
    Script { node: String, message: String },

    #[error("provider request failed: {0}")]
    Request(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors reported by the session directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory record not found: {0}")]
    NotFound(String),

    #[error("timed out after {elapsed:?} waiting for {resource}")]
    Timeout { resource: String, elapsed: Duration },

    #[error("invalid host name: {0}")]
    HostName(#[from] HostNameError),

    #[error("directory request failed: {0}")]
    Request(String),
}

/// A session host name that does not follow `{pool}/{node}[.{domain}]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostNameError {
    #[error("missing pool separator in {0:?}")]
    MissingSeparator(String),

    #[error("empty pool name in {0:?}")]
    EmptyPool(String),

    #[error("invalid display name in {0:?}")]
    InvalidDisplayName(String),
}

/// Errors loading or validating `hostpool.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

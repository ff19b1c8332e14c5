//! Scheduler error types.

use hostpool_core::{ConfigError, DirectoryError, ProviderError};
use hostpool_reservations::ReservationError;
use thiserror::Error;

/// Errors that abort a reconciliation pass. Existing hosts are left
/// untouched when one of these is returned.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("pool not configured: {0}")]
    UnknownPool(String),

    #[error("reservation rebuild failed: {0}")]
    Reservations(#[from] ReservationError),

    #[error("failed to list session hosts for pool {pool}: {source}")]
    ListHosts {
        pool: String,
        #[source]
        source: DirectoryError,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// A host lifecycle step that failed, naming the host it failed for.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("creating node {host} failed: {source}")]
    CreateNode {
        host: String,
        #[source]
        source: ProviderError,
    },

    #[error("fetching registration token for {host} failed: {source}")]
    RegistrationToken {
        host: String,
        #[source]
        source: DirectoryError,
    },

    #[error("setup script on {host} failed: {source}")]
    RunScript {
        host: String,
        #[source]
        source: ProviderError,
    },

    #[error("starting node {host} failed: {source}")]
    StartNode {
        host: String,
        #[source]
        source: ProviderError,
    },

    #[error("{host} did not become ready: {source}")]
    WaitReady {
        host: String,
        #[source]
        source: DirectoryError,
    },
}

impl LifecycleError {
    /// Name of the step that failed, for structured logs.
    pub fn step(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "create_node",
            Self::RegistrationToken { .. } => "registration_token",
            Self::RunScript { .. } => "run_script",
            Self::StartNode { .. } => "start_node",
            Self::WaitReady { .. } => "wait_ready",
        }
    }
}

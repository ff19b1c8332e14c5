//! Reservation rebuild errors.

use hostpool_core::{DirectoryError, ProviderError};
use thiserror::Error;

pub type ReservationResult<T> = Result<T, ReservationError>;

/// Failures that abort a rebuild. Per-slot failures never surface here.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("failed to list app groups for pool {pool}: {source}")]
    ListSlots {
        pool: String,
        #[source]
        source: DirectoryError,
    },

    #[error("failed to fetch workload inventory: {0}")]
    Inventory(#[source] ProviderError),
}

//! hostpool-reservations — who is holding capacity in each pool.
//!
//! A reservation is one workload with a granted app group in a pool. The
//! set of reservations is never trusted incrementally: every
//! reconciliation pass rebuilds it from the directory and the compute
//! inventory, and swaps the whole set in at once.
//!
//! # Rebuild
//!
//! ```text
//! list_app_groups(pool) ─┐
//! list_all(inventory) ───┼─► validate each slot (bounded fan-out)
//!                        │     ├── workload exists and is running
//!                        │     ├── at least one assignment
//!                        │     └── otherwise delete the app group
//!                        └─► ReservationStore::replace(pool, valid set)
//! ```

pub mod error;
pub mod rebuild;
pub mod store;

pub use error::{ReservationError, ReservationResult};
pub use rebuild::{RebuildSummary, ReservationRebuilder};
pub use store::ReservationStore;

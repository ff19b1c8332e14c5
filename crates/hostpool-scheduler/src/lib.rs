//! hostpool-scheduler — keeps each pool's session host count at target.
//!
//! The [`Reconciler`] runs capacity passes. Each pass rebuilds the pool's
//! reservations, classifies its hosts, sizes the pool, and then resumes,
//! creates, or purges hosts to match.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── PoolLockRegistry (one pass per pool at a time)
//!   ├── ReservationRebuilder ─► ReservationStore
//!   ├── classify + CapacityPlan (hostpool-autoscale)
//!   ├── HostLifecycle
//!   │     ├── create: node ─► token ─► setup script ─► wait ready
//!   │     ├── resume: start ─► wait ready
//!   │     └── purge:  host record ─► backing node (best-effort)
//!   └── TaskGroup (parallel purges, joined before moving on)
//! ```
//!
//! Triggers come from [`PoolEvent`]s via [`Reconciler::handle_event`] and
//! from the periodic [`Reconciler::run`] loop.

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod lock;
pub mod reconciler;
pub mod tasks;

pub use error::{LifecycleError, SchedulerError, SchedulerResult};
pub use events::PoolEvent;
pub use lifecycle::{HostLifecycle, LifecycleTimeouts, PurgeOutcome};
pub use lock::{PoolGuard, PoolLockRegistry};
pub use reconciler::{MIN_RECONCILE_INTERVAL, PassReport, Reconciler};
pub use tasks::{TaskGroup, TaskOutcome};

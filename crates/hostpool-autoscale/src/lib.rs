//! hostpool-autoscale — how many hosts a pool needs, and which ones it has.
//!
//! Two pieces, both free of side effects on the outside world:
//!
//! - [`classify`] buckets the directory's host list for one pass.
//! - [`capacity_target`] turns a reservation count into a host count.
//!
//! # Sizing
//!
//! ```text
//! raw    = ceil((reservations + 1) / max_sessions_per_host)
//! target = clamp(raw, min_hosts, max_hosts)
//! ```
//!
//! The `+ 1` keeps one session of headroom for the reservation that
//! triggered the pass before it shows up in the rebuilt set.
//!
//! # Classification
//!
//! ```text
//! status missing        → ToDelete
//! Available             → Up
//! Shutdown, node exists → Resumable
//! Shutdown, otherwise   → ToDelete
//! anything else         → ToDelete
//! ```

pub mod classifier;
pub mod planner;

pub use classifier::{Classification, ResumableHost, StaleHost, StaleReason, classify};
pub use planner::{CapacityPlan, capacity_target};

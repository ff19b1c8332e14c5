//! hostpool-sim — an in-memory cloud for tests and simulation.
//!
//! [`SimCloud`] implements both [`ComputeProvider`] and
//! [`SessionDirectory`] over one shared state, so starting a node flips
//! its session host to `Available` and running the setup script on a new
//! node registers a host in the node's pool, the way the real services
//! behave once an agent checks in.
//!
//! Faults are injected per call site through [`Faults`]; every mutating
//! call is counted in [`CallStats`].
//!
//! [`ComputeProvider`]: hostpool_core::ComputeProvider
//! [`SessionDirectory`]: hostpool_core::SessionDirectory

pub mod cloud;
mod compute;
mod directory;
pub mod seed;

pub use cloud::{CallStats, Faults, SimCloud};
pub use seed::seed_pool;

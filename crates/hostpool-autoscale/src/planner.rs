//! Capacity planner — reservation count in, host count out.

use hostpool_core::PoolConfig;

/// Sizing parameters for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPlan {
    pub max_sessions_per_host: u32,
    pub min_hosts: u32,
    pub max_hosts: u32,
}

impl CapacityPlan {
    pub fn for_pool(pool: &PoolConfig) -> Self {
        Self {
            max_sessions_per_host: pool.max_sessions_per_host,
            min_hosts: pool.min_hosts,
            max_hosts: pool.max_hosts,
        }
    }

    /// Number of hosts that must be up for `reservations`.
    pub fn target(&self, reservations: usize) -> u32 {
        capacity_target(
            reservations,
            self.max_sessions_per_host,
            self.min_hosts,
            self.max_hosts,
        )
    }
}

/// `ceil((reservations + 1) / max_sessions_per_host)`, clamped to
/// `[min_hosts, max_hosts]`.
///
/// A `max_sessions_per_host` of zero is treated as one. If `min_hosts`
/// exceeds `max_hosts` the result is `max_hosts`.
pub fn capacity_target(
    reservations: usize,
    max_sessions_per_host: u32,
    min_hosts: u32,
    max_hosts: u32,
) -> u32 {
    let per_host = u64::from(max_sessions_per_host.max(1));
    let demand = (reservations as u64).saturating_add(1);
    let raw = u32::try_from(demand.div_ceil(per_host)).unwrap_or(u32::MAX);

    // Not `clamp`: it panics when min > max.
    raw.max(min_hosts).min(max_hosts)
}

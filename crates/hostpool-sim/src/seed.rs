//! Seeding helpers for simulation runs.

use hostpool_core::{HostStatus, PowerState};

use crate::cloud::SimCloud;

/// Populate `pool` with `shutdown_hosts` deallocated session hosts and
/// `workloads` running workloads, each holding one assigned app group.
pub fn seed_pool(cloud: &SimCloud, pool: &str, shutdown_hosts: usize, workloads: usize) {
    for i in 0..shutdown_hosts {
        cloud.add_host(pool, &format!("{pool}-seed-{i:02}"), Some(HostStatus::Shutdown));
    }
    for i in 0..workloads {
        cloud.add_workload(pool, &format!("{pool}-wl-{i:03}"), PowerState::Running, 1);
    }
}

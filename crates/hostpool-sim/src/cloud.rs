//! Shared state behind the simulated compute provider and directory.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hostpool_core::{
    AppGroup, Assignment, ComputeNode, HostName, HostStatus, NodeSpec, PowerState, SessionHost,
};

/// Fault switches consulted by the simulated calls.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_list_hosts: bool,
    pub fail_list_app_groups: bool,
    pub fail_inventory: bool,
    pub fail_registration_token: bool,
    pub fail_script: bool,
    /// Number of upcoming `create` calls that fail.
    pub fail_creates: u32,
    pub fail_start: HashSet<String>,
    /// Nodes that power on but never report `Available`.
    pub stall_ready: HashSet<String>,
    pub fail_delete_node: HashSet<String>,
    pub fail_delete_host: HashSet<String>,
    pub fail_delete_app_group: HashSet<String>,
    pub fail_assignments: HashSet<String>,
}

/// Counters of mutating calls that reached the simulated cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub nodes_created: u32,
    pub nodes_started: u32,
    pub nodes_stopped: u32,
    pub nodes_deleted: u32,
    pub hosts_deleted: u32,
    pub app_groups_deleted: u32,
    pub scripts_run: u32,
}

impl CallStats {
    /// Creations, starts, and deletions of any kind.
    pub fn mutations(&self) -> u32 {
        self.nodes_created
            + self.nodes_started
            + self.nodes_deleted
            + self.hosts_deleted
            + self.app_groups_deleted
    }
}

#[derive(Debug, Default)]
pub(crate) struct CloudState {
    pub(crate) nodes: BTreeMap<String, ComputeNode>,
    /// Session hosts in registration order.
    pub(crate) hosts: Vec<SessionHost>,
    pub(crate) app_groups: BTreeMap<String, AppGroup>,
    pub(crate) assignments: BTreeMap<String, Vec<Assignment>>,
    pub(crate) faults: Faults,
    pub(crate) stats: CallStats,
    pub(crate) next_ip: u32,
}

impl CloudState {
    pub(crate) fn set_host_status(&mut self, node_id: &str, status: HostStatus) {
        for host in &mut self.hosts {
            if HostName::parse(&host.name).is_ok_and(|n| n.node_id == node_id) {
                host.status = Some(status);
            }
        }
    }

    pub(crate) fn ready_host(&self, pool: &str, node_id: &str) -> Option<SessionHost> {
        self.hosts
            .iter()
            .find(|h| {
                HostName::parse(&h.name).is_ok_and(|n| n.pool == pool && n.node_id == node_id)
                    && h.status == Some(HostStatus::Available)
            })
            .cloned()
    }

    pub(crate) fn allocate_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.0.{}.{}", self.next_ip / 250, self.next_ip % 250 + 4)
    }
}

/// An in-memory cloud implementing both capability traits.
///
/// Cloning is cheap; clones share state.
#[derive(Clone, Default)]
pub struct SimCloud {
    state: Arc<Mutex<CloudState>>,
    latency: Duration,
}

impl SimCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every trait call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    // ── Seeding ──────────────────────────────────────────────────

    /// Add a compute node with the given power state and tags.
    pub fn add_node(&self, id: &str, power_state: PowerState, tags: BTreeMap<String, String>) {
        let mut state = self.lock();
        let private_ip = Some(state.allocate_ip());
        state.nodes.insert(
            id.to_string(),
            ComputeNode {
                id: id.to_string(),
                name: id.to_string(),
                power_state,
                private_ip,
                tags,
            },
        );
    }

    /// Register a raw session host record, without touching nodes.
    pub fn add_host_record(&self, host: SessionHost) {
        self.lock().hosts.push(host);
    }

    /// Add a pool node plus its session host with the given status.
    ///
    /// Returns the host's directory name.
    pub fn add_host(&self, pool: &str, node_id: &str, status: Option<HostStatus>) -> String {
        let power = match status {
            Some(HostStatus::Available) => PowerState::Running,
            _ => PowerState::Deallocated,
        };
        let mut tags = BTreeMap::new();
        tags.insert(NodeSpec::POOL_TAG.to_string(), pool.to_string());
        self.add_node(node_id, power, tags);

        let name = SessionHost::directory_name(pool, &format!("{node_id}.sim.local"));
        self.add_host_record(SessionHost::new(name.clone(), status));
        name
    }

    /// Add a workload node and an app group granting it a reservation in
    /// `pool` with `assignments` principals.
    pub fn add_workload(&self, pool: &str, workload_id: &str, power: PowerState, assignments: usize) {
        let mut tags = BTreeMap::new();
        tags.insert("role".to_string(), "workload".to_string());
        self.add_node(workload_id, power, tags);
        self.add_app_group(pool, workload_id, assignments);
    }

    /// Add an app group for `workload_id` without creating its node.
    pub fn add_app_group(&self, pool: &str, workload_id: &str, assignments: usize) -> String {
        let name = format!("ag-{workload_id}");
        let mut state = self.lock();
        state.app_groups.insert(
            name.clone(),
            AppGroup {
                name: name.clone(),
                pool: pool.to_string(),
                workload_id: workload_id.to_string(),
            },
        );
        state.assignments.insert(
            name.clone(),
            (0..assignments)
                .map(|i| Assignment {
                    principal_id: format!("user-{workload_id}-{i}"),
                })
                .collect(),
        );
        name
    }

    /// Delete a node out-of-band, leaving its directory record behind.
    pub fn remove_node(&self, id: &str) -> bool {
        self.lock().nodes.remove(id).is_some()
    }

    pub fn set_power(&self, id: &str, power: PowerState) {
        if let Some(node) = self.lock().nodes.get_mut(id) {
            node.power_state = power;
        }
    }

    /// Mutate the fault switches.
    pub fn faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.lock().faults);
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn stats(&self) -> CallStats {
        self.lock().stats.clone()
    }

    /// Session hosts currently registered in `pool`.
    pub fn hosts(&self, pool: &str) -> Vec<SessionHost> {
        let prefix = format!("{pool}/");
        self.lock()
            .hosts
            .iter()
            .filter(|h| h.name.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Number of hosts in `pool` reporting `Available`.
    pub fn available_hosts(&self, pool: &str) -> usize {
        self.hosts(pool)
            .iter()
            .filter(|h| h.status == Some(HostStatus::Available))
            .count()
    }

    pub fn node(&self, id: &str) -> Option<ComputeNode> {
        self.lock().nodes.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn app_group_names(&self) -> Vec<String> {
        self.lock().app_groups.keys().cloned().collect()
    }
}

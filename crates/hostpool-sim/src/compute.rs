//! `ComputeProvider` over the simulated cloud.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use hostpool_core::{
    ComputeNode, ComputeProvider, HostStatus, NodeFilter, NodeSpec, PowerState, ProviderError,
    ProviderResult, SessionHost,
};

use crate::cloud::SimCloud;

#[async_trait]
impl ComputeProvider for SimCloud {
    async fn create(&self, spec: &NodeSpec) -> ProviderResult<ComputeNode> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_creates > 0 {
            state.faults.fail_creates -= 1;
            return Err(ProviderError::Request(format!(
                "[SIM] quota exceeded creating {}",
                spec.name
            )));
        }
        if state.nodes.contains_key(&spec.name) {
            return Err(ProviderError::Request(format!(
                "[SIM] node {} already exists",
                spec.name
            )));
        }

        let node = ComputeNode {
            id: spec.name.clone(),
            name: spec.name.clone(),
            power_state: PowerState::Running,
            private_ip: Some(state.allocate_ip()),
            tags: spec.tags.clone(),
        };
        state.nodes.insert(node.id.clone(), node.clone());
        state.stats.nodes_created += 1;
        debug!(node = %node.id, image = %spec.image, size = %spec.size, "[SIM] node created");
        Ok(node)
    }

    async fn start(&self, id: &str) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_start.contains(id) {
            return Err(ProviderError::Request(format!("[SIM] start of {id} rejected")));
        }
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        node.power_state = PowerState::Running;
        state.stats.nodes_started += 1;

        if !state.faults.stall_ready.contains(id) {
            state.set_host_status(id, HostStatus::Available);
        }
        debug!(node = %id, "[SIM] node started");
        Ok(())
    }

    async fn stop(&self, id: &str) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        node.power_state = PowerState::Deallocated;
        state.stats.nodes_stopped += 1;
        state.set_host_status(id, HostStatus::Shutdown);
        Ok(())
    }

    async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_delete_node.contains(id) {
            return Err(ProviderError::Request(format!("[SIM] delete of {id} rejected")));
        }
        state
            .nodes
            .remove(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        state.stats.nodes_deleted += 1;
        debug!(node = %id, "[SIM] node deleted");
        Ok(())
    }

    async fn get(&self, id: &str, include_state: bool) -> ProviderResult<ComputeNode> {
        self.pause().await;
        let state = self.lock();
        let mut node = state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        if !include_state {
            node.private_ip = None;
        }
        Ok(node)
    }

    async fn list_all(&self, filter: &NodeFilter) -> ProviderResult<Vec<ComputeNode>> {
        self.pause().await;
        let state = self.lock();
        if state.faults.fail_inventory {
            return Err(ProviderError::Request("[SIM] inventory unavailable".to_string()));
        }
        Ok(state
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    /// Registers the node as a session host in its pool, provided the
    /// script carries that pool's registration token.
    async fn run_remote_script(
        &self,
        id: &str,
        script: &str,
        _timeout: Duration,
        _poll_interval: Duration,
    ) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_script {
            return Err(ProviderError::Script {
                node: id.to_string(),
                message: "[SIM] exit code 1".to_string(),
            });
        }
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        let pool = node
            .tags
            .get(NodeSpec::POOL_TAG)
            .cloned()
            .ok_or_else(|| ProviderError::Script {
                node: id.to_string(),
                message: "[SIM] node carries no pool tag".to_string(),
            })?;
        if !script.contains(&crate::directory::token_for(&pool)) {
            return Err(ProviderError::Script {
                node: id.to_string(),
                message: format!("[SIM] registration to {pool} refused: bad token"),
            });
        }

        let status = if state.faults.stall_ready.contains(id) {
            HostStatus::Unavailable
        } else {
            HostStatus::Available
        };
        let name = SessionHost::directory_name(&pool, &format!("{id}.sim.local"));
        state.hosts.push(SessionHost::new(name, Some(status)));
        state.stats.scripts_run += 1;
        debug!(node = %id, %pool, "[SIM] setup script ran, host registered");
        Ok(())
    }
}

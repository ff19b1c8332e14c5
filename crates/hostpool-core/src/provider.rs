//! Capability traits for the two external collaborators.
//!
//! The reconciler never talks to a cloud API directly. It holds an
//! `Arc<dyn ComputeProvider>` for node lifecycle and an
//! `Arc<dyn SessionDirectory>` for the host/app-group directory.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DirectoryResult, HostNameError, ProviderResult};
use crate::types::*;

/// Compute node lifecycle operations.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Create a node and return it once the provider has accepted it.
    async fn create(&self, spec: &NodeSpec) -> ProviderResult<ComputeNode>;

    /// Power on a stopped node.
    async fn start(&self, id: &str) -> ProviderResult<()>;

    /// Power off a running node.
    async fn stop(&self, id: &str) -> ProviderResult<()>;

    /// Delete a node. Returns `NotFound` if it is already gone.
    async fn delete(&self, id: &str) -> ProviderResult<()>;

    /// Fetch one node, optionally including network state.
    async fn get(&self, id: &str, include_state: bool) -> ProviderResult<ComputeNode>;

    /// List every node matching `filter` in a single call.
    async fn list_all(&self, filter: &NodeFilter) -> ProviderResult<Vec<ComputeNode>>;

    /// Run `script` on the node, polling every `poll_interval` until it
    /// finishes or `timeout` elapses.
    async fn run_remote_script(
        &self,
        id: &str,
        script: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ProviderResult<()>;
}

/// Session host and app group directory.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// List every session host registered in `pool`.
    async fn list_hosts(&self, pool: &str) -> DirectoryResult<Vec<SessionHost>>;

    /// Remove a session host record.
    async fn delete_host(&self, host: &SessionHost) -> DirectoryResult<()>;

    /// Block until the host backed by `node_id` reports `Available`.
    async fn wait_for_ready(
        &self,
        pool: &str,
        node_id: &str,
        timeout: Duration,
    ) -> DirectoryResult<SessionHost>;

    /// List the app groups (reservation slots) attached to `pool`.
    async fn list_app_groups(&self, pool: &str) -> DirectoryResult<Vec<AppGroup>>;

    async fn delete_app_group(&self, name: &str) -> DirectoryResult<()>;

    async fn list_assignments(&self, app_group: &str) -> DirectoryResult<Vec<Assignment>>;

    /// Fetch (or mint) the token a new node uses to join `pool`.
    async fn retrieve_registration_token(&self, pool: &str) -> DirectoryResult<RegistrationToken>;

    /// Split a host's directory name into pool, display name, and node id.
    fn parse_host_name(&self, host: &SessionHost) -> Result<HostName, HostNameError> {
        HostName::parse(&host.name)
    }
}

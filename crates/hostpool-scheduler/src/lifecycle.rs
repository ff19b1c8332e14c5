//! Host lifecycle — bring a session host into a pool, bring a stopped one
//! back, or remove one entirely.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use hostpool_autoscale::ResumableHost;
use hostpool_core::config::TimeoutsConfig;
use hostpool_core::{
    ComputeProvider, DirectoryError, NodeSpec, PoolConfig, SessionDirectory, SessionHost,
    SetupScript,
};

use crate::error::LifecycleError;

/// Bounds on every blocking lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimeouts {
    pub script: Duration,
    pub script_poll_interval: Duration,
    pub ready: Duration,
    pub resume_ready: Duration,
}

impl LifecycleTimeouts {
    pub fn from_config(timeouts: &TimeoutsConfig) -> Self {
        Self {
            script: timeouts.script(),
            script_poll_interval: timeouts.script_poll_interval(),
            ready: timeouts.ready(),
            resume_ready: timeouts.resume_ready(),
        }
    }
}

/// What a purge managed to remove. Records already gone count as removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub host_removed: bool,
    pub node_removed: bool,
}

impl PurgeOutcome {
    pub fn is_complete(&self) -> bool {
        self.host_removed && self.node_removed
    }
}

/// Creates, resumes, and purges session hosts. Cheap to clone.
#[derive(Clone)]
pub struct HostLifecycle {
    compute: Arc<dyn ComputeProvider>,
    directory: Arc<dyn SessionDirectory>,
    script: SetupScript,
    host_prefix: String,
    timeouts: LifecycleTimeouts,
}

impl HostLifecycle {
    pub fn new(
        compute: Arc<dyn ComputeProvider>,
        directory: Arc<dyn SessionDirectory>,
        script: SetupScript,
        host_prefix: impl Into<String>,
        timeouts: LifecycleTimeouts,
    ) -> Self {
        Self {
            compute,
            directory,
            script,
            host_prefix: host_prefix.into(),
            timeouts,
        }
    }

    /// A fresh `{prefix}-{8 hex}` node name.
    fn allocate_name(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.host_prefix, &id[..8])
    }

    /// Provision a node, register it with the pool, and wait until the
    /// directory reports it ready.
    pub async fn create(&self, pool: &PoolConfig) -> Result<SessionHost, LifecycleError> {
        let name = self.allocate_name();
        info!(pool = %pool.name, host = %name, "provisioning session host");

        let spec = NodeSpec::for_pool(&name, &pool.name, &pool.template);
        self.compute
            .create(&spec)
            .await
            .map_err(|source| LifecycleError::CreateNode {
                host: name.clone(),
                source,
            })?;

        if let Err(e) = self.register(pool, &name).await {
            self.discard_node(&name).await;
            return Err(e);
        }

        let host = self
            .directory
            .wait_for_ready(&pool.name, &name, self.timeouts.ready)
            .await
            .map_err(|source| LifecycleError::WaitReady {
                host: name.clone(),
                source,
            })?;

        info!(pool = %pool.name, host = %host.name, "session host ready");
        Ok(host)
    }

    /// Run the setup script that joins node `name` to the pool.
    async fn register(&self, pool: &PoolConfig, name: &str) -> Result<(), LifecycleError> {
        let token = self
            .directory
            .retrieve_registration_token(&pool.name)
            .await
            .map_err(|source| LifecycleError::RegistrationToken {
                host: name.to_string(),
                source,
            })?;

        let script = self.script.render(&pool.name, &token, name);
        debug!(host = %name, timeout = ?self.timeouts.script, "running setup script");
        self.compute
            .run_remote_script(
                name,
                &script,
                self.timeouts.script,
                self.timeouts.script_poll_interval,
            )
            .await
            .map_err(|source| LifecycleError::RunScript {
                host: name.to_string(),
                source,
            })
    }

    /// Best-effort removal of a node that never got a directory record.
    async fn discard_node(&self, name: &str) {
        match self.compute.delete(name).await {
            Ok(()) => debug!(host = %name, "discarded unregistered node"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(host = %name, error = %e, "failed to discard unregistered node"),
        }
    }

    /// Power on a shut-down host and wait for it to report ready.
    pub async fn resume(
        &self,
        pool: &str,
        candidate: &ResumableHost,
    ) -> Result<SessionHost, LifecycleError> {
        let host = &candidate.host.name;
        info!(%pool, %host, "resuming session host");

        self.compute
            .start(&candidate.node_id)
            .await
            .map_err(|source| LifecycleError::StartNode {
                host: host.clone(),
                source,
            })?;

        self.directory
            .wait_for_ready(pool, &candidate.node_id, self.timeouts.resume_ready)
            .await
            .map_err(|source| LifecycleError::WaitReady {
                host: host.clone(),
                source,
            })
    }

    /// Delete the directory record, then the backing node.
    ///
    /// Never fails: both deletions are best-effort and their errors are
    /// logged and discarded.
    pub async fn purge(&self, host: &SessionHost) -> PurgeOutcome {
        let mut outcome = PurgeOutcome::default();
        let parsed = self.directory.parse_host_name(host);

        match self.directory.delete_host(host).await {
            Ok(()) => outcome.host_removed = true,
            Err(DirectoryError::NotFound(_)) => {
                debug!(host = %host.name, "host record already gone");
                outcome.host_removed = true;
            }
            Err(e) => warn!(host = %host.name, error = %e, "failed to delete host record"),
        }

        let name = match parsed {
            Ok(name) => name,
            Err(e) => {
                warn!(host = %host.name, error = %e, "cannot identify backing node, skipping node deletion");
                return outcome;
            }
        };

        match self.compute.delete(&name.node_id).await {
            Ok(()) => outcome.node_removed = true,
            Err(e) if e.is_not_found() => {
                debug!(host = %host.name, node = %name.node_id, "backing node already gone");
                outcome.node_removed = true;
            }
            Err(e) => warn!(
                host = %host.name,
                node = %name.node_id,
                error = %e,
                "failed to delete backing node"
            ),
        }

        info!(
            host = %host.name,
            host_removed = outcome.host_removed,
            node_removed = outcome.node_removed,
            "session host purged"
        );
        outcome
    }
}

//! `SessionDirectory` over the simulated cloud.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use hostpool_core::{
    AppGroup, Assignment, DirectoryError, DirectoryResult, RegistrationToken, SessionDirectory,
    SessionHost,
};

use crate::cloud::SimCloud;

const READY_POLL: Duration = Duration::from_millis(50);

pub(crate) fn token_for(pool: &str) -> String {
    format!("sim-token-{pool}")
}

#[async_trait]
impl SessionDirectory for SimCloud {
    async fn list_hosts(&self, pool: &str) -> DirectoryResult<Vec<SessionHost>> {
        self.pause().await;
        if self.lock().faults.fail_list_hosts {
            return Err(DirectoryError::Request("[SIM] host listing unavailable".to_string()));
        }
        Ok(self.hosts(pool))
    }

    async fn delete_host(&self, host: &SessionHost) -> DirectoryResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_delete_host.contains(&host.name) {
            return Err(DirectoryError::Request(format!(
                "[SIM] delete of {} rejected",
                host.name
            )));
        }
        let before = state.hosts.len();
        state.hosts.retain(|h| h.name != host.name);
        if state.hosts.len() == before {
            return Err(DirectoryError::NotFound(host.name.clone()));
        }
        state.stats.hosts_deleted += 1;
        debug!(host = %host.name, "[SIM] session host deleted");
        Ok(())
    }

    async fn wait_for_ready(
        &self,
        pool: &str,
        node_id: &str,
        timeout: Duration,
    ) -> DirectoryResult<SessionHost> {
        let poll = async {
            loop {
                let ready = self.lock().ready_host(pool, node_id);
                if let Some(host) = ready {
                    return host;
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DirectoryError::Timeout {
                resource: format!("{pool}/{node_id}"),
                elapsed: timeout,
            })
    }

    async fn list_app_groups(&self, pool: &str) -> DirectoryResult<Vec<AppGroup>> {
        self.pause().await;
        let state = self.lock();
        if state.faults.fail_list_app_groups {
            return Err(DirectoryError::Request(
                "[SIM] app group listing unavailable".to_string(),
            ));
        }
        Ok(state
            .app_groups
            .values()
            .filter(|g| g.pool == pool)
            .cloned()
            .collect())
    }

    async fn delete_app_group(&self, name: &str) -> DirectoryResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.faults.fail_delete_app_group.contains(name) {
            return Err(DirectoryError::Request(format!("[SIM] delete of {name} rejected")));
        }
        state
            .app_groups
            .remove(name)
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))?;
        state.assignments.remove(name);
        state.stats.app_groups_deleted += 1;
        debug!(app_group = %name, "[SIM] app group deleted");
        Ok(())
    }

    async fn list_assignments(&self, app_group: &str) -> DirectoryResult<Vec<Assignment>> {
        self.pause().await;
        let state = self.lock();
        if state.faults.fail_assignments.contains(app_group) {
            return Err(DirectoryError::Request(format!(
                "[SIM] assignments of {app_group} unavailable"
            )));
        }
        Ok(state.assignments.get(app_group).cloned().unwrap_or_default())
    }

    async fn retrieve_registration_token(&self, pool: &str) -> DirectoryResult<RegistrationToken> {
        self.pause().await;
        if self.lock().faults.fail_registration_token {
            return Err(DirectoryError::Request(format!(
                "[SIM] token for {pool} unavailable"
            )));
        }
        Ok(RegistrationToken::new(token_for(pool)))
    }
}

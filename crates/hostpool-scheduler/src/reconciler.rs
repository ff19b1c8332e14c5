//! Reconciler — the per-pool capacity control loop.
//!
//! One pass, under the pool's lock:
//!
//! ```text
//! rebuild reservations ─► list hosts ─► classify ─► target
//!   ─► purge stale (parallel, joined)
//!   ─► resume shut-down hosts until up ≥ target
//!   ─► create hosts until up ≥ target (sequential)
//!   ─► purge leftover shut-down hosts (parallel, joined)
//! ```
//!
//! Failing to rebuild reservations or list hosts aborts the pass before
//! anything is touched. Everything after that is per-host: a failure is
//! logged, counted in the [`PassReport`], and the pass carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use hostpool_autoscale::{CapacityPlan, Classification, classify};
use hostpool_core::{
    ComputeProvider, OrchestratorConfig, PoolConfig, SessionDirectory, SessionHost,
};
use hostpool_reservations::{RebuildSummary, ReservationRebuilder, ReservationStore};

use crate::error::{SchedulerError, SchedulerResult};
use crate::events::PoolEvent;
use crate::lifecycle::{HostLifecycle, LifecycleTimeouts, PurgeOutcome};
use crate::lock::PoolLockRegistry;
use crate::tasks::TaskGroup;

/// Floor for the periodic reconcile interval.
pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_millis(1);

/// What one successful pass observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub pool: String,
    pub reservations: usize,
    pub target: u32,
    /// Hosts up at the end of the pass.
    pub up: usize,
    pub resumed: usize,
    pub failed_resumes: usize,
    pub created: usize,
    pub failed_creates: usize,
    pub stale_deleted: usize,
    pub surplus_deleted: usize,
}

impl PassReport {
    pub fn converged(&self) -> bool {
        self.up >= self.target as usize
    }
}

/// Drives capacity passes for every configured pool.
pub struct Reconciler {
    config: OrchestratorConfig,
    directory: Arc<dyn SessionDirectory>,
    compute: Arc<dyn ComputeProvider>,
    rebuilder: ReservationRebuilder,
    lifecycle: HostLifecycle,
    locks: PoolLockRegistry,
}

impl Reconciler {
    pub fn new(
        config: OrchestratorConfig,
        directory: Arc<dyn SessionDirectory>,
        compute: Arc<dyn ComputeProvider>,
    ) -> SchedulerResult<Self> {
        Self::with_store(config, directory, compute, ReservationStore::new())
    }

    /// Build a reconciler around an existing reservation store.
    pub fn with_store(
        config: OrchestratorConfig,
        directory: Arc<dyn SessionDirectory>,
        compute: Arc<dyn ComputeProvider>,
        store: ReservationStore,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        let script = config.setup_script()?;

        let rebuilder = ReservationRebuilder::new(
            directory.clone(),
            compute.clone(),
            store,
            config.orchestrator.rebuild_concurrency,
        );
        let lifecycle = HostLifecycle::new(
            compute.clone(),
            directory.clone(),
            script,
            config.orchestrator.host_prefix.clone(),
            LifecycleTimeouts::from_config(&config.timeouts),
        );

        Ok(Self {
            config,
            directory,
            compute,
            rebuilder,
            lifecycle,
            locks: PoolLockRegistry::new(),
        })
    }

    pub fn reservations(&self) -> &ReservationStore {
        self.rebuilder.store()
    }

    pub fn locks(&self) -> &PoolLockRegistry {
        &self.locks
    }

    pub fn pools(&self) -> impl Iterator<Item = &str> {
        self.config.pools.iter().map(|p| p.name.as_str())
    }

    fn pool_config(&self, pool: &str) -> SchedulerResult<&PoolConfig> {
        self.config
            .pool(pool)
            .ok_or_else(|| SchedulerError::UnknownPool(pool.to_string()))
    }

    /// Rebuild `pool`'s reservation set on its own, under the pool lock.
    pub async fn rebuild_reservations(&self, pool: &str) -> SchedulerResult<RebuildSummary> {
        self.pool_config(pool)?;
        let _guard = self.locks.acquire(pool).await;
        Ok(self.rebuilder.rebuild(pool).await?)
    }

    /// Run one capacity pass for `pool`.
    ///
    /// Safe to call repeatedly and concurrently: passes for the same pool
    /// run one at a time, and a pass with nothing to do changes nothing.
    pub async fn ensure_capacity(&self, pool: &str) -> SchedulerResult<PassReport> {
        let pool_config = self.pool_config(pool)?;
        let guard = self.locks.acquire(pool).await;
        debug!(pool = guard.pool(), "reconciliation pass started");

        let rebuilt = self.rebuilder.rebuild(pool).await?;

        let hosts = self
            .directory
            .list_hosts(pool)
            .await
            .map_err(|source| SchedulerError::ListHosts {
                pool: pool.to_string(),
                source,
            })?;

        let Classification {
            mut up,
            mut resumable,
            to_delete,
        } = classify(hosts, self.directory.as_ref(), self.compute.as_ref()).await;

        let target = CapacityPlan::for_pool(pool_config).target(rebuilt.reservations);
        let mut report = PassReport {
            pool: pool.to_string(),
            reservations: rebuilt.reservations,
            target,
            ..Default::default()
        };
        debug!(
            %pool,
            reservations = report.reservations,
            target,
            up = up.len(),
            resumable = resumable.len(),
            stale = to_delete.len(),
            "hosts classified"
        );

        // Counts below are the pre-cleanup Up/Resumable buckets; stale
        // hosts were never in either.
        report.stale_deleted = self
            .purge_all("stale", to_delete.into_iter().map(|s| s.host))
            .await;

        let target = target as usize;
        while up.len() < target {
            let Some(candidate) = resumable.pop_front() else {
                break;
            };
            match self.lifecycle.resume(pool, &candidate).await {
                Ok(host) => {
                    up.push(host);
                    report.resumed += 1;
                }
                Err(e) => {
                    warn!(%pool, step = e.step(), error = %e, "resume failed, dropping host for this pass");
                    report.failed_resumes += 1;
                }
            }
        }

        let missing = target.saturating_sub(up.len());
        for _ in 0..missing {
            match self.lifecycle.create(pool_config).await {
                Ok(host) => {
                    up.push(host);
                    report.created += 1;
                }
                Err(e) => {
                    warn!(%pool, step = e.step(), error = %e, "host creation failed");
                    report.failed_creates += 1;
                }
            }
        }

        report.surplus_deleted = self
            .purge_all("surplus", resumable.into_iter().map(|r| r.host))
            .await;

        report.up = up.len();
        if report.converged() {
            info!(
                %pool,
                up = report.up,
                target = report.target,
                resumed = report.resumed,
                created = report.created,
                deleted = report.stale_deleted + report.surplus_deleted,
                "reconciliation pass complete"
            );
        } else {
            warn!(
                %pool,
                up = report.up,
                target = report.target,
                failed_resumes = report.failed_resumes,
                failed_creates = report.failed_creates,
                "reconciliation pass finished short of target"
            );
        }
        Ok(report)
    }

    /// Purge `hosts` in parallel and wait for all of them. Returns how many
    /// were fully removed.
    async fn purge_all(
        &self,
        kind: &'static str,
        hosts: impl Iterator<Item = SessionHost>,
    ) -> usize {
        let mut group: TaskGroup<PurgeOutcome> = TaskGroup::new(kind);
        for host in hosts {
            let lifecycle = self.lifecycle.clone();
            group.spawn(host.name.clone(), async move { lifecycle.purge(&host).await });
        }
        if group.is_empty() {
            return 0;
        }

        let outcomes = group.join().await;
        let removed = outcomes
            .iter()
            .filter(|o| o.output.is_some_and(|p| p.is_complete()))
            .count();
        debug!(kind, attempted = outcomes.len(), removed, "purge sweep finished");
        removed
    }

    /// Reconcile the pool an event belongs to.
    pub async fn handle_event(&self, event: PoolEvent) -> SchedulerResult<PassReport> {
        info!(pool = %event.pool(), %event, "reconciliation triggered");
        self.ensure_capacity(event.pool()).await
    }

    /// Run a pass for every configured pool concurrently.
    pub async fn reconcile_all(self: &Arc<Self>) -> Vec<(String, SchedulerResult<PassReport>)> {
        let mut passes = JoinSet::new();
        for pool in self.pools() {
            let this = Arc::clone(self);
            let pool = pool.to_string();
            passes.spawn(async move {
                let result = this.ensure_capacity(&pool).await;
                (pool, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok((pool, result)) => {
                    if let Err(e) = &result {
                        error!(%pool, error = %e, "reconciliation pass failed");
                    }
                    results.push((pool, result));
                }
                Err(e) => error!(error = %e, "reconciliation task panicked"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Reconcile every pool each `interval` until `shutdown` flips.
    ///
    /// The first round runs immediately. A round still in flight when
    /// shutdown arrives is dropped; purges it already spawned carry on.
    /// Intervals shorter than [`MIN_RECONCILE_INTERVAL`] are raised to it.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        if interval < MIN_RECONCILE_INTERVAL {
            warn!(
                requested = ?interval,
                "reconcile interval too short, using {MIN_RECONCILE_INTERVAL:?}"
            );
        }
        let interval = interval.max(MIN_RECONCILE_INTERVAL);
        info!(
            interval_secs = interval.as_secs(),
            pools = self.config.pools.len(),
            "reconciler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.reconcile_all() => {}
                        _ = shutdown.changed() => {
                            info!("reconciler shutting down mid-round");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hostpool_core::{HostStatus, NodeTemplate, PowerState};
    use hostpool_sim::{SimCloud, seed_pool};

    use super::*;

    fn config(pools: &[(&str, u32, u32, u32)]) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::scaffold();
        config.timeouts.ready = "5s".to_string();
        config.timeouts.resume_ready = "2s".to_string();
        config.pools = pools
            .iter()
            .map(|&(name, per_host, min, max)| PoolConfig {
                name: name.to_string(),
                max_sessions_per_host: per_host,
                min_hosts: min,
                max_hosts: max,
                template: NodeTemplate {
                    image: "img".to_string(),
                    size: "small".to_string(),
                    security_profile: "standard".to_string(),
                },
            })
            .collect();
        config
    }

    fn reconciler(cloud: &SimCloud, config: OrchestratorConfig) -> Reconciler {
        let cloud = Arc::new(cloud.clone());
        Reconciler::new(config, cloud.clone(), cloud).unwrap()
    }

    #[tokio::test]
    async fn resumes_before_creating() {
        let cloud = SimCloud::new();
        // 5 reservations at 4 per host: target 2.
        seed_pool(&cloud, "pool-a", 1, 5);
        let reconciler = reconciler(&cloud, config(&[("pool-a", 4, 1, 10)]));

        let report = reconciler.ensure_capacity("pool-a").await.unwrap();

        assert_eq!(report.reservations, 5);
        assert_eq!(report.target, 2);
        assert_eq!(report.resumed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.up, 2);
        assert!(report.converged());
        assert_eq!(cloud.available_hosts("pool-a"), 2);
    }

    #[tokio::test]
    async fn leftover_shutdown_hosts_are_surplus() {
        let cloud = SimCloud::new();
        seed_pool(&cloud, "pool-a", 4, 0);
        let reconciler = reconciler(&cloud, config(&[("pool-a", 4, 1, 10)]));

        let report = reconciler.ensure_capacity("pool-a").await.unwrap();

        assert_eq!(report.target, 1);
        assert_eq!(report.resumed, 1);
        assert_eq!(report.surplus_deleted, 3);
        assert_eq!(cloud.hosts("pool-a").len(), 1);
        assert_eq!(cloud.stats().nodes_created, 0);
    }

    #[tokio::test]
    async fn stale_hosts_are_purged() {
        let cloud = SimCloud::new();
        cloud.add_host("pool-a", "sh-up", Some(HostStatus::Available));
        cloud.add_host("pool-a", "sh-nostatus", None);
        cloud.add_host("pool-a", "sh-orphan", Some(HostStatus::Shutdown));
        cloud.remove_node("sh-orphan");
        let reconciler = reconciler(&cloud, config(&[("pool-a", 4, 1, 10)]));

        let report = reconciler.ensure_capacity("pool-a").await.unwrap();

        assert_eq!(report.stale_deleted, 2);
        assert_eq!(report.up, 1);
        let names: Vec<String> = cloud.hosts("pool-a").into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["pool-a/sh-up.sim.local"]);
    }

    #[tokio::test]
    async fn unknown_pool_is_rejected() {
        let cloud = SimCloud::new();
        let reconciler = reconciler(&cloud, config(&[("pool-a", 4, 1, 10)]));

        assert!(matches!(
            reconciler.ensure_capacity("pool-z").await,
            Err(SchedulerError::UnknownPool(_))
        ));
        assert!(matches!(
            reconciler.rebuild_reservations("pool-z").await,
            Err(SchedulerError::UnknownPool(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let cloud = SimCloud::new();
        let cloud = Arc::new(cloud);
        let bad = config(&[("pool-a", 4, 5, 2)]);
        assert!(matches!(
            Reconciler::new(bad, cloud.clone(), cloud),
            Err(SchedulerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn rebuild_reservations_updates_store() {
        let cloud = SimCloud::new();
        cloud.add_workload("pool-a", "wl-1", PowerState::Running, 1);
        cloud.add_workload("pool-a", "wl-2", PowerState::Stopped, 1);
        let reconciler = reconciler(&cloud, config(&[("pool-a", 4, 1, 10)]));

        let summary = reconciler.rebuild_reservations("pool-a").await.unwrap();

        assert_eq!(summary.reservations, 1);
        assert_eq!(reconciler.reservations().count("pool-a").await, 1);
        assert!(!reconciler.locks().is_locked("pool-a").await);
    }

    #[tokio::test]
    async fn handle_event_reconciles_its_pool() {
        let cloud = SimCloud::new();
        let reconciler = reconciler(
            &cloud,
            config(&[("pool-a", 4, 1, 10), ("pool-b", 4, 1, 10)]),
        );

        let report = reconciler
            .handle_event(PoolEvent::LeaseAcquired {
                pool: "pool-b".to_string(),
                workload_id: "wl-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(report.pool, "pool-b");
        assert_eq!(cloud.available_hosts("pool-b"), 1);
        assert_eq!(cloud.available_hosts("pool-a"), 0);
    }

    #[tokio::test]
    async fn reconcile_all_covers_every_pool() {
        let cloud = SimCloud::new();
        let reconciler = Arc::new(reconciler(
            &cloud,
            config(&[("pool-b", 4, 2, 10), ("pool-a", 4, 1, 10)]),
        ));

        let results = reconciler.reconcile_all().await;

        let pools: Vec<&str> = results.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(pools, vec!["pool-a", "pool-b"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(cloud.available_hosts("pool-a"), 1);
        assert_eq!(cloud.available_hosts("pool-b"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let cloud = SimCloud::new();
        let reconciler = Arc::new(reconciler(&cloud, config(&[("pool-a", 4, 1, 10)])));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(Duration::from_secs(60), rx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cloud.available_hosts("pool-a"), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_with_zero_interval_uses_floor() {
        let cloud = SimCloud::new();
        let reconciler = Arc::new(reconciler(&cloud, config(&[("pool-a", 4, 1, 10)])));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(Duration::ZERO, rx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cloud.available_hosts("pool-a"), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

//! Reconciliation integration tests.
//!
//! Drives full passes against the simulated cloud: convergence,
//! idempotence, per-pool serialization, and degraded passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hostpool_core::*;
use hostpool_scheduler::{PoolEvent, Reconciler, SchedulerError};
use hostpool_sim::{SimCloud, seed_pool};

fn test_config(pools: &[(&str, u32, u32, u32)]) -> OrchestratorConfig {
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
                image: "win11-multisession".to_string(),
                size: "Standard_D4s_v5".to_string(),
                security_profile: "trusted-launch".to_string(),
            },
        })
        .collect();
    config
}

fn reconciler_for(cloud: &SimCloud, config: OrchestratorConfig) -> Arc<Reconciler> {
    let cloud = Arc::new(cloud.clone());
    Arc::new(Reconciler::new(config, cloud.clone(), cloud).unwrap())
}

/// Directory wrapper that tracks how many passes are between their slot
/// listing and their host listing at once.
struct CountingDirectory {
    inner: SimCloud,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl CountingDirectory {
    fn new(inner: SimCloud, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDirectory for CountingDirectory {
    async fn list_hosts(&self, pool: &str) -> DirectoryResult<Vec<SessionHost>> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.list_hosts(pool).await
    }

    async fn delete_host(&self, host: &SessionHost) -> DirectoryResult<()> {
        self.inner.delete_host(host).await
    }

    async fn wait_for_ready(
        &self,
        pool: &str,
        node_id: &str,
        timeout: Duration,
    ) -> DirectoryResult<SessionHost> {
        self.inner.wait_for_ready(pool, node_id, timeout).await
    }

    async fn list_app_groups(&self, pool: &str) -> DirectoryResult<Vec<AppGroup>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.list_app_groups(pool).await
    }

    async fn delete_app_group(&self, name: &str) -> DirectoryResult<()> {
        self.inner.delete_app_group(name).await
    }

    async fn list_assignments(&self, app_group: &str) -> DirectoryResult<Vec<Assignment>> {
        self.inner.list_assignments(app_group).await
    }

    async fn retrieve_registration_token(&self, pool: &str) -> DirectoryResult<RegistrationToken> {
        self.inner.retrieve_registration_token(pool).await
    }
}

#[tokio::test]
async fn second_pass_changes_nothing() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 3, 5);
    cloud.add_host("pool-a", "sh-stale", None);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let first = reconciler.ensure_capacity("pool-a").await.unwrap();
    assert_eq!(first.target, 2);
    assert_eq!(first.resumed, 2);
    assert_eq!(first.stale_deleted, 1);
    assert_eq!(first.surplus_deleted, 1);
    let after_first = cloud.stats();

    let second = reconciler.ensure_capacity("pool-a").await.unwrap();

    assert_eq!(second.up, first.up);
    assert_eq!(second.target, first.target);
    assert_eq!(
        (second.resumed, second.created, second.stale_deleted, second.surplus_deleted),
        (0, 0, 0, 0)
    );
    assert_eq!(cloud.stats().mutations(), after_first.mutations());
}

#[tokio::test(start_paused = true)]
async fn concurrent_passes_for_one_pool_run_one_at_a_time() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 0, 9);
    let directory = Arc::new(CountingDirectory::new(
        cloud.clone(),
        Duration::from_millis(50),
    ));
    let reconciler = Arc::new(
        Reconciler::new(
            test_config(&[("pool-a", 4, 1, 10)]),
            directory.clone(),
            Arc::new(cloud.clone()),
        )
        .unwrap(),
    );

    let mut passes = Vec::new();
    for _ in 0..8 {
        let reconciler = reconciler.clone();
        passes.push(tokio::spawn(async move {
            reconciler.ensure_capacity("pool-a").await
        }));
    }
    for pass in passes {
        pass.await.unwrap().unwrap();
    }

    assert_eq!(directory.max_active(), 1);
    // ceil(10 / 4) = 3, created exactly once.
    assert_eq!(cloud.available_hosts("pool-a"), 3);
    assert_eq!(cloud.stats().nodes_created, 3);
}

#[tokio::test(start_paused = true)]
async fn different_pools_reconcile_concurrently() {
    let cloud = SimCloud::new();
    let directory = Arc::new(CountingDirectory::new(
        cloud.clone(),
        Duration::from_millis(50),
    ));
    let reconciler = Arc::new(
        Reconciler::new(
            test_config(&[("pool-a", 4, 1, 10), ("pool-b", 4, 1, 10)]),
            directory.clone(),
            Arc::new(cloud.clone()),
        )
        .unwrap(),
    );

    let results = reconciler.reconcile_all().await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(directory.max_active(), 2);
    assert_eq!(cloud.available_hosts("pool-a"), 1);
    assert_eq!(cloud.available_hosts("pool-b"), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_resume_does_not_block_the_rest() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 3, 5);
    cloud.faults(|f| {
        f.stall_ready.insert("pool-a-seed-00".to_string());
    });
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let report = reconciler.ensure_capacity("pool-a").await.unwrap();

    assert_eq!(report.target, 2);
    assert_eq!(report.failed_resumes, 1);
    assert_eq!(report.resumed, 2);
    assert_eq!(report.created, 0);
    assert!(report.converged());
}

#[tokio::test]
async fn failed_creates_leave_the_pass_short_but_successful() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 0, 7);
    cloud.faults(|f| f.fail_creates = 1);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let report = reconciler.ensure_capacity("pool-a").await.unwrap();

    assert_eq!(report.target, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed_creates, 1);
    assert!(!report.converged());

    // The next trigger closes the gap.
    let report = reconciler.ensure_capacity("pool-a").await.unwrap();
    assert_eq!(report.created, 1);
    assert!(report.converged());
    assert_eq!(cloud.available_hosts("pool-a"), 2);
}

#[tokio::test]
async fn host_listing_failure_aborts_untouched() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 2, 5);
    cloud.add_host("pool-a", "sh-stale", None);
    cloud.faults(|f| f.fail_list_hosts = true);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let err = reconciler.ensure_capacity("pool-a").await.unwrap_err();

    assert!(matches!(err, SchedulerError::ListHosts { .. }));
    assert_eq!(cloud.stats().mutations(), 0);
    assert_eq!(cloud.hosts("pool-a").len(), 3);
}

#[tokio::test]
async fn reservation_failure_aborts_untouched() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 2, 0);
    cloud.add_host("pool-a", "sh-stale", None);
    cloud.faults(|f| f.fail_inventory = true);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let err = reconciler.ensure_capacity("pool-a").await.unwrap_err();

    assert!(matches!(err, SchedulerError::Reservations(_)));
    assert_eq!(cloud.stats().mutations(), 0);
    assert!(!reconciler.locks().is_locked("pool-a").await);
}

#[tokio::test]
async fn orphaned_records_are_purged_without_error() {
    let cloud = SimCloud::new();
    cloud.add_host("pool-a", "sh-01", Some(HostStatus::Available));
    cloud.add_host("pool-a", "sh-gone", Some(HostStatus::Shutdown));
    cloud.remove_node("sh-gone");
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    let report = reconciler.ensure_capacity("pool-a").await.unwrap();

    assert_eq!(report.stale_deleted, 1);
    assert_eq!(report.resumed, 0);
    assert_eq!(cloud.hosts("pool-a").len(), 1);
    assert_eq!(cloud.stats().nodes_started, 0);
}

#[tokio::test]
async fn rebuild_drops_workloads_that_stopped() {
    let cloud = SimCloud::new();
    cloud.add_workload("pool-a", "wl-1", PowerState::Running, 1);
    cloud.add_workload("pool-a", "wl-2", PowerState::Running, 1);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    reconciler.rebuild_reservations("pool-a").await.unwrap();
    assert_eq!(reconciler.reservations().count("pool-a").await, 2);

    cloud.set_power("wl-2", PowerState::Deallocated);
    reconciler.rebuild_reservations("pool-a").await.unwrap();

    let set = reconciler.reservations().get("pool-a").await;
    assert_eq!(set.len(), 1);
    assert!(set.contains("wl-1"));
    assert_eq!(cloud.app_group_names(), vec!["ag-wl-1".to_string()]);
}

#[tokio::test]
async fn lease_events_grow_the_pool() {
    let cloud = SimCloud::new();
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 2, 1, 10)]));
    reconciler.ensure_capacity("pool-a").await.unwrap();
    assert_eq!(cloud.available_hosts("pool-a"), 1);

    for i in 0..4 {
        let workload_id = format!("wl-{i}");
        cloud.add_workload("pool-a", &workload_id, PowerState::Running, 1);
        reconciler
            .handle_event(PoolEvent::LeaseAcquired {
                pool: "pool-a".to_string(),
                workload_id,
            })
            .await
            .unwrap();
    }

    // ceil((4 + 1) / 2) = 3.
    assert_eq!(cloud.available_hosts("pool-a"), 3);
}

#[tokio::test]
async fn pool_never_exceeds_max_hosts() {
    let cloud = SimCloud::new();
    seed_pool(&cloud, "pool-a", 0, 100);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 5)]));

    let report = reconciler.ensure_capacity("pool-a").await.unwrap();

    assert_eq!(report.target, 5);
    assert_eq!(cloud.available_hosts("pool-a"), 5);
}

#[tokio::test]
async fn failed_setup_leaves_no_nodes_behind() {
    let cloud = SimCloud::new();
    cloud.faults(|f| f.fail_script = true);
    let reconciler = reconciler_for(&cloud, test_config(&[("pool-a", 4, 1, 10)]));

    for _ in 0..3 {
        let report = reconciler.ensure_capacity("pool-a").await.unwrap();
        assert_eq!(report.failed_creates, 1);
    }

    assert_eq!(cloud.stats().nodes_created, 3);
    assert_eq!(cloud.node_count(), 0);
    assert!(cloud.hosts("pool-a").is_empty());
}

//! Per-pool mutual exclusion.
//!
//! One `tokio::sync::Mutex<()>` per pool, created on first use. Passes for
//! the same pool queue up behind it in FIFO order; passes for different
//! pools never contend. Not reentrant.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one pass; dropping it releases the pool.
#[derive(Debug)]
pub struct PoolGuard {
    pool: String,
    _guard: OwnedMutexGuard<()>,
}

impl PoolGuard {
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

/// Lock registry keyed by pool name.
///
/// `Clone` shares the registry; one registry is owned per orchestrator.
#[derive(Clone, Default)]
pub struct PoolLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PoolLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, pool: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(pool.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until `pool` is free and take it.
    pub async fn acquire(&self, pool: &str) -> PoolGuard {
        let lock = self.lock_for(pool).await;
        PoolGuard {
            pool: pool.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Take `pool` only if nobody holds it.
    pub async fn try_acquire(&self, pool: &str) -> Option<PoolGuard> {
        let lock = self.lock_for(pool).await;
        let guard = lock.try_lock_owned().ok()?;
        Some(PoolGuard {
            pool: pool.to_string(),
            _guard: guard,
        })
    }

    /// Whether a pass currently holds `pool`. Does not register the pool.
    pub async fn is_locked(&self, pool: &str) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(pool)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn querying_unknown_pools_does_not_register_them() {
        let locks = PoolLockRegistry::new();
        for i in 0..50 {
            assert!(!locks.is_locked(&format!("ghost-{i}")).await);
        }
        assert!(locks.locks.lock().await.is_empty());

        let _guard = locks.acquire("pool-a").await;
        assert!(locks.is_locked("pool-a").await);
        assert_eq!(locks.locks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn same_pool_is_exclusive() {
        let locks = PoolLockRegistry::new();
        let guard = locks.acquire("pool-a").await;
        assert_eq!(guard.pool(), "pool-a");

        assert!(locks.is_locked("pool-a").await);
        assert!(locks.try_acquire("pool-a").await.is_none());

        drop(guard);
        assert!(!locks.is_locked("pool-a").await);
        assert!(locks.try_acquire("pool-a").await.is_some());
    }

    #[tokio::test]
    async fn different_pools_do_not_contend() {
        let locks = PoolLockRegistry::new();
        let _a = locks.acquire("pool-a").await;
        assert!(locks.try_acquire("pool-b").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_proceeds_after_release() {
        let locks = PoolLockRegistry::new();
        let guard = locks.acquire("pool-a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("pool-a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}

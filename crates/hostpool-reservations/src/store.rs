//! ReservationStore — per-pool reservation sets, swapped whole.
//!
//! Each pool maps to an `Arc<HashSet<WorkloadId>>`. Writers build a new
//! set off to the side and swap it in under the write lock; readers clone
//! the `Arc` and keep reading the set they got, so nobody ever observes a
//! half-rebuilt set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use hostpool_core::WorkloadId;

/// Reservation sets keyed by pool name.
///
/// `Clone` shares the underlying map; one store is owned per orchestrator.
#[derive(Clone, Default)]
pub struct ReservationStore {
    sets: Arc<RwLock<HashMap<String, Arc<HashSet<WorkloadId>>>>>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current set for `pool`; empty if the pool was never rebuilt.
    pub async fn get(&self, pool: &str) -> Arc<HashSet<WorkloadId>> {
        let sets = self.sets.read().await;
        sets.get(pool).cloned().unwrap_or_default()
    }

    /// Number of reservations currently recorded for `pool`.
    pub async fn count(&self, pool: &str) -> usize {
        let sets = self.sets.read().await;
        sets.get(pool).map_or(0, |s| s.len())
    }

    pub async fn contains(&self, pool: &str, workload_id: &str) -> bool {
        let sets = self.sets.read().await;
        sets.get(pool).is_some_and(|s| s.contains(workload_id))
    }

    /// Replace the set for `pool`, returning the previous size.
    pub async fn replace(&self, pool: &str, fresh: HashSet<WorkloadId>) -> usize {
        let count = fresh.len();
        let previous = {
            let mut sets = self.sets.write().await;
            sets.insert(pool.to_string(), Arc::new(fresh))
        };
        let previous = previous.map_or(0, |s| s.len());
        debug!(%pool, previous, count, "reservation set replaced");
        previous
    }

}

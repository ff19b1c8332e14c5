//! Reservation rebuild — derive a pool's reservation set from the outside
//! world and swap it into the store.
//!
//! Listing the slots or the inventory failing aborts the rebuild; the
//! caller must not scale against an unknown reservation count. Anything
//! that goes wrong with a single slot is logged and isolated to that slot.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use hostpool_core::{
    AppGroup, ComputeProvider, NodeFilter, NodeId, PowerState, SessionDirectory, WorkloadId,
};

use crate::error::{ReservationError, ReservationResult};
use crate::store::ReservationStore;

/// Counts from one rebuild, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// App groups listed for the pool.
    pub slots: usize,
    /// Distinct workloads in the new reservation set.
    pub reservations: usize,
    /// Invalid slots whose app group was deleted.
    pub pruned: usize,
    /// Invalid slots whose deletion failed.
    pub prune_failed: usize,
    /// Slots whose validity could not be determined this pass.
    pub undetermined: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvalidReason {
    MissingWorkload,
    InactiveWorkload(PowerState),
    NoAssignments,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingWorkload => f.write_str("workload not in inventory"),
            Self::InactiveWorkload(state) => write!(f, "workload is {state:?}"),
            Self::NoAssignments => f.write_str("no assignments"),
        }
    }
}

#[derive(Debug)]
enum SlotVerdict {
    Valid(WorkloadId),
    Invalid { pruned: bool },
    Undetermined,
}

/// Rebuilds reservation sets for any pool.
#[derive(Clone)]
pub struct ReservationRebuilder {
    directory: Arc<dyn SessionDirectory>,
    compute: Arc<dyn ComputeProvider>,
    store: ReservationStore,
    /// Maximum concurrent slot validations.
    concurrency: usize,
}

impl ReservationRebuilder {
    pub fn new(
        directory: Arc<dyn SessionDirectory>,
        compute: Arc<dyn ComputeProvider>,
        store: ReservationStore,
        concurrency: usize,
    ) -> Self {
        Self {
            directory,
            compute,
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    /// Rebuild the reservation set for `pool` and replace the stored one.
    pub async fn rebuild(&self, pool: &str) -> ReservationResult<RebuildSummary> {
        let slots = self
            .directory
            .list_app_groups(pool)
            .await
            .map_err(|source| ReservationError::ListSlots {
                pool: pool.to_string(),
                source,
            })?;

        // One batched inventory call instead of a lookup per slot.
        let inventory = self
            .compute
            .list_all(&NodeFilter::all())
            .await
            .map_err(ReservationError::Inventory)?;
        let index: Arc<HashMap<NodeId, PowerState>> = Arc::new(
            inventory
                .into_iter()
                .map(|node| (node.id, node.power_state))
                .collect(),
        );

        let mut summary = RebuildSummary {
            slots: slots.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        for slot in slots {
            let directory = self.directory.clone();
            let index = index.clone();
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return SlotVerdict::Undetermined;
                };
                validate_slot(directory, &index, slot).await
            });
        }

        let mut fresh: HashSet<WorkloadId> = HashSet::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(SlotVerdict::Valid(workload_id)) => {
                    fresh.insert(workload_id);
                }
                Ok(SlotVerdict::Invalid { pruned: true }) => summary.pruned += 1,
                Ok(SlotVerdict::Invalid { pruned: false }) => summary.prune_failed += 1,
                Ok(SlotVerdict::Undetermined) => summary.undetermined += 1,
                Err(e) => {
                    error!(%pool, error = %e, "slot validation task panicked");
                    summary.undetermined += 1;
                }
            }
        }

        summary.reservations = fresh.len();
        let previous = self.store.replace(pool, fresh).await;

        info!(
            %pool,
            reservations = summary.reservations,
            previous,
            slots = summary.slots,
            pruned = summary.pruned,
            undetermined = summary.undetermined,
            "reservations rebuilt"
        );
        Ok(summary)
    }
}

/// Check one slot against the inventory and its assignments, deleting
/// its app group if it no longer holds a reservation.
async fn validate_slot(
    directory: Arc<dyn SessionDirectory>,
    index: &HashMap<NodeId, PowerState>,
    slot: AppGroup,
) -> SlotVerdict {
    let reason = match index.get(&slot.workload_id) {
        None => InvalidReason::MissingWorkload,
        Some(state) if !state.is_active() => InvalidReason::InactiveWorkload(*state),
        Some(_) => match directory.list_assignments(&slot.name).await {
            Ok(assignments) if assignments.is_empty() => InvalidReason::NoAssignments,
            Ok(_) => return SlotVerdict::Valid(slot.workload_id),
            Err(e) => {
                warn!(
                    app_group = %slot.name,
                    error = %e,
                    "could not list assignments, skipping slot this pass"
                );
                return SlotVerdict::Undetermined;
            }
        },
    };

    debug!(
        app_group = %slot.name,
        workload = %slot.workload_id,
        %reason,
        "slot no longer valid, deleting app group"
    );

    // Spawned so that aborting the rebuild does not cancel an issued delete.
    let name = slot.name.clone();
    let deletion = tokio::spawn(async move { directory.delete_app_group(&name).await });
    match deletion.await {
        Ok(Ok(())) => SlotVerdict::Invalid { pruned: true },
        Ok(Err(e)) => {
            warn!(app_group = %slot.name, error = %e, "failed to delete invalid app group");
            SlotVerdict::Invalid { pruned: false }
        }
        Err(e) => {
            error!(app_group = %slot.name, error = %e, "app group deletion task panicked");
            SlotVerdict::Invalid { pruned: false }
        }
    }
}

//! External lifecycle events that trigger a reconciliation pass.

use std::fmt;

use hostpool_core::{NodeId, PoolName, WorkloadId};

/// A change in the outside world that may have moved a pool's capacity.
///
/// Every event maps to one `ensure_capacity` call for its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    NodeStarted { pool: PoolName, node_id: NodeId },
    NodeStopped { pool: PoolName, node_id: NodeId },
    NodeDeleted { pool: PoolName, node_id: NodeId },
    /// A workload was granted a reservation.
    LeaseAcquired {
        pool: PoolName,
        workload_id: WorkloadId,
    },
}

impl PoolEvent {
    pub fn pool(&self) -> &str {
        match self {
            Self::NodeStarted { pool, .. }
            | Self::NodeStopped { pool, .. }
            | Self::NodeDeleted { pool, .. }
            | Self::LeaseAcquired { pool, .. } => pool,
        }
    }
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeStarted { node_id, .. } => write!(f, "node {node_id} started"),
            Self::NodeStopped { node_id, .. } => write!(f, "node {node_id} stopped"),
            Self::NodeDeleted { node_id, .. } => write!(f, "node {node_id} deleted"),
            Self::LeaseAcquired { workload_id, .. } => {
                write!(f, "lease acquired by {workload_id}")
            }
        }
    }
}

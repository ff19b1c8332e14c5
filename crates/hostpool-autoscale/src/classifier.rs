//! Host classifier — bucket each reported host for the current pass.
//!
//! Every input host lands in exactly one bucket and keeps its input order
//! there. Nothing is remembered between passes.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use hostpool_core::{
    ComputeProvider, HostNameError, HostStatus, NodeId, SessionDirectory, SessionHost,
};

/// Why a host was put in the delete bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The directory returned the record without status fields.
    MissingStatus,
    /// Neither `Available` nor `Shutdown`.
    UnrecognizedStatus(HostStatus),
    /// `Shutdown`, but the name does not identify a backing node.
    UnparseableName(HostNameError),
    /// `Shutdown`, but the backing node is gone.
    NodeMissing(NodeId),
    /// `Shutdown`, and the backing node could not be looked up.
    NodeLookupFailed { node_id: NodeId, error: String },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStatus => f.write_str("missing status"),
            Self::UnrecognizedStatus(status) => write!(f, "status {status}"),
            Self::UnparseableName(e) => write!(f, "{e}"),
            Self::NodeMissing(id) => write!(f, "backing node {id} not found"),
            Self::NodeLookupFailed { node_id, error } => {
                write!(f, "lookup of backing node {node_id} failed: {error}")
            }
        }
    }
}

/// A shut-down host whose backing node still exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableHost {
    pub host: SessionHost,
    pub node_id: NodeId,
}

/// A host to purge, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleHost {
    pub host: SessionHost,
    pub reason: StaleReason,
}

/// Result of classifying one host listing.
#[derive(Debug, Default)]
pub struct Classification {
    pub up: Vec<SessionHost>,
    /// Popped from the front, so resumption follows listing order.
    pub resumable: VecDeque<ResumableHost>,
    pub to_delete: Vec<StaleHost>,
}

impl Classification {
    /// Total hosts across all buckets.
    pub fn len(&self) -> usize {
        self.up.len() + self.resumable.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status-only verdict, before any node lookups.
#[derive(Debug, PartialEq, Eq)]
enum Triage {
    Up,
    Shutdown,
    Stale(StaleReason),
}

fn triage(host: &SessionHost) -> Triage {
    match host.status {
        None => Triage::Stale(StaleReason::MissingStatus),
        Some(HostStatus::Available) => Triage::Up,
        Some(HostStatus::Shutdown) => Triage::Shutdown,
        Some(other) => Triage::Stale(StaleReason::UnrecognizedStatus(other)),
    }
}

/// Partition `hosts` into Up, Resumable, and ToDelete.
///
/// Shut-down hosts are checked one at a time against the compute
/// provider; any failure to locate the backing node makes the host stale.
pub async fn classify(
    hosts: Vec<SessionHost>,
    directory: &dyn SessionDirectory,
    compute: &dyn ComputeProvider,
) -> Classification {
    let mut out = Classification::default();

    for host in hosts {
        let reason = match triage(&host) {
            Triage::Up => {
                out.up.push(host);
                continue;
            }
            Triage::Stale(reason) => reason,
            Triage::Shutdown => match directory.parse_host_name(&host) {
                Err(e) => StaleReason::UnparseableName(e),
                Ok(name) => match compute.get(&name.node_id, false).await {
                    Ok(_) => {
                        out.resumable.push_back(ResumableHost {
                            host,
                            node_id: name.node_id,
                        });
                        continue;
                    }
                    Err(e) if e.is_not_found() => StaleReason::NodeMissing(name.node_id),
                    Err(e) => StaleReason::NodeLookupFailed {
                        node_id: name.node_id,
                        error: e.to_string(),
                    },
                },
            },
        };

        debug!(host = %host.name, %reason, "host classified stale");
        out.to_delete.push(StaleHost { host, reason });
    }

    out
}

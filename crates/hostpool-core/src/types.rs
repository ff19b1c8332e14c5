//! Domain types for the host pool reconciler.
//!
//! These records mirror what the compute provider and the session
//! directory report. None of them are persisted locally; every
//! reconciliation pass reads them fresh.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HostNameError;

/// Name of a shared host pool.
pub type PoolName = String;

/// Identifier of a compute node at the provider.
pub type NodeId = String;

/// Identifier of a workload holding a reservation.
pub type WorkloadId = String;

// ── Session hosts ─────────────────────────────────────────────────

/// Status reported by the session directory for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Available,
    Shutdown,
    Unavailable,
    Upgrading,
    NeedsAssistance,
    Unknown,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Shutdown => "shutdown",
            Self::Unavailable => "unavailable",
            Self::Upgrading => "upgrading",
            Self::NeedsAssistance => "needs_assistance",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A directory record for one compute node attached to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHost {
    /// Full directory name, `{pool}/{display_name}`.
    pub name: String,
    /// `None` when the directory returned a record without status fields.
    pub status: Option<HostStatus>,
    /// Error message attached by the directory, if any.
    pub error: Option<String>,
}

impl SessionHost {
    pub fn new(name: impl Into<String>, status: Option<HostStatus>) -> Self {
        Self {
            name: name.into(),
            status,
            error: None,
        }
    }

    /// Build the directory name for a node registered in `pool`.
    pub fn directory_name(pool: &str, display_name: &str) -> String {
        format!("{pool}/{display_name}")
    }
}

/// The parts recovered from a session host name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostName {
    pub pool: PoolName,
    /// Display name as registered, possibly carrying a DNS suffix.
    pub display_name: String,
    /// Backing compute node identifier (display name without DNS suffix).
    pub node_id: NodeId,
}

impl HostName {
    /// Parse `{pool}/{node}[.{domain}]`.
    pub fn parse(name: &str) -> Result<Self, HostNameError> {
        let (pool, display) = name
            .split_once('/')
            .ok_or_else(|| HostNameError::MissingSeparator(name.to_string()))?;

        if pool.is_empty() {
            return Err(HostNameError::EmptyPool(name.to_string()));
        }
        if display.is_empty() || display.contains('/') {
            return Err(HostNameError::InvalidDisplayName(name.to_string()));
        }

        let node_id = display.split('.').next().unwrap_or_default();
        if node_id.is_empty() {
            return Err(HostNameError::InvalidDisplayName(name.to_string()));
        }

        Ok(Self {
            pool: pool.to_string(),
            display_name: display.to_string(),
            node_id: node_id.to_string(),
        })
    }
}

// ── Compute nodes ─────────────────────────────────────────────────

/// Power state reported by the compute provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deallocated,
    Unknown,
}

impl PowerState {
    /// Whether the node counts as running for reservation purposes.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }
}

/// A compute node as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    pub id: NodeId,
    pub name: String,
    pub power_state: PowerState,
    /// Only populated when fetched with `include_state`.
    pub private_ip: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Image, size, and security profile used for new session hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub image: String,
    pub size: String,
    pub security_profile: String,
}

/// Minimal specification handed to the provider when creating a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub image: String,
    pub size: String,
    pub security_profile: String,
    pub tags: BTreeMap<String, String>,
}

impl NodeSpec {
    /// Tag key carrying the pool a session host node belongs to.
    pub const POOL_TAG: &'static str = "hostpool";

    /// Build a spec for a session host node in `pool`.
    pub fn for_pool(name: &str, pool: &str, template: &NodeTemplate) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(Self::POOL_TAG.to_string(), pool.to_string());
        Self {
            name: name.to_string(),
            image: template.image.clone(),
            size: template.size.clone(),
            security_profile: template.security_profile.clone(),
            tags,
        }
    }
}

/// Tag filter for listing nodes. An empty filter matches every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub tags: BTreeMap<String, String>,
}

impl NodeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tagged(key: &str, value: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(key.to_string(), value.to_string());
        Self { tags }
    }

    pub fn matches(&self, node: &ComputeNode) -> bool {
        self.tags
            .iter()
            .all(|(k, v)| node.tags.get(k).is_some_and(|nv| nv == v))
    }
}

// ── Reservations ──────────────────────────────────────────────────

/// An app group granted to one workload: the directory's record of a
/// reservation against a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppGroup {
    pub name: String,
    pub pool: PoolName,
    pub workload_id: WorkloadId,
}

/// A principal assigned to an app group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub principal_id: String,
}

/// Token a new node presents to join a pool.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationToken(String);

impl RegistrationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RegistrationToken(***)")
    }
}

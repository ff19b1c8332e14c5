//! hostpool-core — shared vocabulary for the session host pool reconciler.
//!
//! Holds the records observed from the outside world (session hosts,
//! compute nodes, app groups), the two capability traits through which
//! they are observed ([`ComputeProvider`], [`SessionDirectory`]), the
//! `hostpool.toml` configuration model, and the setup script template.

pub mod config;
pub mod error;
pub mod provider;
pub mod script;
pub mod types;

pub use config::{OrchestratorConfig, PoolConfig, parse_duration};
pub use error::{
    ConfigError, DirectoryError, DirectoryResult, HostNameError, ProviderError, ProviderResult,
};
pub use provider::{ComputeProvider, SessionDirectory};
pub use script::{ScriptError, SetupScript};
pub use types::*;

//! hostpool.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::script::SetupScript;
use crate::types::NodeTemplate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    pub setup: SetupConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Prefix for generated node names (`{prefix}-{8 hex}`).
    #[serde(default = "default_host_prefix")]
    pub host_prefix: String,
    /// Maximum concurrent slot validations during a reservation rebuild.
    #[serde(default = "default_rebuild_concurrency")]
    pub rebuild_concurrency: usize,
    /// Interval of the periodic reconcile loop (e.g. "60s").
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Upper bound on remote setup script execution.
    #[serde(default = "default_script_timeout")]
    pub script: String,
    #[serde(default = "default_script_poll_interval")]
    pub script_poll_interval: String,
    /// Wait for a newly created host to report ready.
    #[serde(default = "default_ready_timeout")]
    pub ready: String,
    /// Wait for a resumed host to report ready.
    #[serde(default = "default_resume_ready_timeout")]
    pub resume_ready: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Setup script template, see [`SetupScript`].
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    pub max_sessions_per_host: u32,
    pub min_hosts: u32,
    pub max_hosts: u32,
    pub template: NodeTemplate,
}

fn default_host_prefix() -> String {
    "sh".to_string()
}

fn default_rebuild_concurrency() -> usize {
    8
}

fn default_reconcile_interval() -> String {
    "60s".to_string()
}

fn default_script_timeout() -> String {
    "20m".to_string()
}

fn default_script_poll_interval() -> String {
    "15s".to_string()
}

fn default_ready_timeout() -> String {
    "10m".to_string()
}

fn default_resume_ready_timeout() -> String {
    "5m".to_string()
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            host_prefix: default_host_prefix(),
            rebuild_concurrency: default_rebuild_concurrency(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            script: default_script_timeout(),
            script_poll_interval: default_script_poll_interval(),
            ready: default_ready_timeout(),
            resume_ready: default_resume_ready_timeout(),
        }
    }
}

impl OrchestratorSettings {
    pub fn reconcile_interval(&self) -> Duration {
        parse_duration(&self.reconcile_interval).unwrap_or(Duration::from_secs(60))
    }
}

impl TimeoutsConfig {
    pub fn script(&self) -> Duration {
        parse_duration(&self.script).unwrap_or(Duration::from_secs(20 * 60))
    }

    pub fn script_poll_interval(&self) -> Duration {
        parse_duration(&self.script_poll_interval).unwrap_or(Duration::from_secs(15))
    }

    pub fn ready(&self) -> Duration {
        parse_duration(&self.ready).unwrap_or(Duration::from_secs(10 * 60))
    }

    pub fn resume_ready(&self) -> Duration {
        parse_duration(&self.resume_ready).unwrap_or(Duration::from_secs(5 * 60))
    }
}

impl OrchestratorConfig {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: OrchestratorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up a pool by name.
    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }

    pub fn setup_script(&self) -> Result<SetupScript, ConfigError> {
        SetupScript::new(self.setup.script.clone())
            .map_err(|e| ConfigError::Invalid(format!("setup.script: {e}")))
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.orchestrator;
        if settings.host_prefix.is_empty()
            || !settings
                .host_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(format!(
                "orchestrator.host_prefix {:?} must be non-empty lowercase alphanumerics or '-'",
                settings.host_prefix
            )));
        }
        if settings.rebuild_concurrency == 0 {
            return Err(invalid("orchestrator.rebuild_concurrency must be at least 1"));
        }

        for (field, value) in [
            ("orchestrator.reconcile_interval", &settings.reconcile_interval),
            ("timeouts.script", &self.timeouts.script),
            ("timeouts.script_poll_interval", &self.timeouts.script_poll_interval),
            ("timeouts.ready", &self.timeouts.ready),
            ("timeouts.resume_ready", &self.timeouts.resume_ready),
        ] {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => return Err(invalid(format!("{field}: invalid duration {value:?}"))),
            }
        }

        self.setup_script()?;

        let mut seen = HashSet::new();
        for pool in &self.pools {
            if pool.name.is_empty() || pool.name.contains('/') {
                return Err(invalid(format!("invalid pool name {:?}", pool.name)));
            }
            if !seen.insert(pool.name.as_str()) {
                return Err(invalid(format!("duplicate pool {:?}", pool.name)));
            }
            if pool.max_sessions_per_host == 0 {
                return Err(invalid(format!(
                    "pool {:?}: max_sessions_per_host must be at least 1",
                    pool.name
                )));
            }
            if pool.min_hosts > pool.max_hosts {
                return Err(invalid(format!(
                    "pool {:?}: min_hosts ({}) exceeds max_hosts ({})",
                    pool.name, pool.min_hosts, pool.max_hosts
                )));
            }
        }

        Ok(())
    }

    /// Scaffold a starter hostpool.toml with one pool.
    pub fn scaffold() -> Self {
        OrchestratorConfig {
            orchestrator: OrchestratorSettings::default(),
            timeouts: TimeoutsConfig::default(),
            setup: SetupConfig {
                script: concat!(
                    "$ErrorActionPreference = \"Stop\"\n",
                    "& C:\\hostpool\\install-agent.ps1 `\n",
                    "    -HostPool \"{{pool}}\" `\n",
                    "    -HostName \"{{host_name}}\" `\n",
                    "    -RegistrationToken \"{{registration_token}}\"\n",
                )
                .to_string(),
            },
            pools: vec![PoolConfig {
                name: "pool-a".to_string(),
                max_sessions_per_host: 4,
                min_hosts: 1,
                max_hosts: 10,
                template: NodeTemplate {
                    image: "win11-multisession".to_string(),
                    size: "Standard_D4s_v5".to_string(),
                    security_profile: "trusted-launch".to_string(),
                },
            }],
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Parse a duration string like "500ms", "30s", "5m", "2h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

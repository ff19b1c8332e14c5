//! hostpoold — the session host pool reconciler daemon.
//!
//! # Usage
//!
//! ```text
//! hostpoold init --path hostpool.toml
//! hostpoold plan --config hostpool.toml --pool pool-a --reservations 17
//! hostpoold simulate --config hostpool.toml --hosts 3 --reservations 9
//! ```
//!
//! `simulate` runs the real reconcile loop against the in-memory cloud
//! until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use hostpool_autoscale::CapacityPlan;
use hostpool_core::{OrchestratorConfig, parse_duration};
use hostpool_scheduler::Reconciler;
use hostpool_sim::{SimCloud, seed_pool};

const DEFAULT_LOG_FILTER: &str = "info,hostpoold=debug,hostpool=debug";

#[derive(Parser)]
#[command(name = "hostpoold", about = "Session host pool reconciler")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter configuration file.
    Init {
        #[arg(long, default_value = "hostpool.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the host target for a pool at a given reservation count.
    Plan {
        #[arg(long, default_value = "hostpool.toml")]
        config: PathBuf,

        #[arg(long)]
        pool: String,

        #[arg(long)]
        reservations: usize,
    },

    /// Run the reconcile loop against an in-memory cloud.
    Simulate {
        #[arg(long, default_value = "hostpool.toml")]
        config: PathBuf,

        /// Shut-down hosts seeded into every pool.
        #[arg(long, default_value = "2")]
        hosts: usize,

        /// Reservations seeded into every pool.
        #[arg(long, default_value = "5")]
        reservations: usize,

        /// Override the configured reconcile interval (e.g. "10s").
        #[arg(long)]
        interval: Option<String>,

        /// Simulated latency of every cloud call (e.g. "200ms").
        #[arg(long, default_value = "50ms")]
        latency: String,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Init { path, force } => init(&path, force),
        Command::Plan {
            config,
            pool,
            reservations,
        } => plan(&config, &pool, reservations),
        Command::Simulate {
            config,
            hosts,
            reservations,
            interval,
            latency,
        } => simulate(&config, hosts, reservations, interval.as_deref(), &latency).await,
    }
}

fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    OrchestratorConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))
}

fn duration_arg(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).with_context(|| format!("--{name}: invalid duration {value:?}"))
}

fn interval_arg(value: &str) -> Result<Duration> {
    let interval = duration_arg("interval", value)?;
    if interval.is_zero() {
        bail!("--interval must be greater than zero");
    }
    Ok(interval)
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = OrchestratorConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "configuration written");
    Ok(())
}

fn plan(config_path: &Path, pool: &str, reservations: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let pool_config = config
        .pool(pool)
        .with_context(|| format!("pool {pool:?} is not configured"))?;

    let plan = CapacityPlan::for_pool(pool_config);
    println!(
        "pool {pool}: {reservations} reservations -> {} hosts (min {}, max {}, {} sessions per host)",
        plan.target(reservations),
        plan.min_hosts,
        plan.max_hosts,
        plan.max_sessions_per_host,
    );
    Ok(())
}

async fn simulate(
    config_path: &Path,
    hosts: usize,
    reservations: usize,
    interval: Option<&str>,
    latency: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let interval = match interval {
        Some(value) => interval_arg(value)?,
        None => config.orchestrator.reconcile_interval(),
    };
    let latency = duration_arg("latency", latency)?;

    let cloud = SimCloud::new().with_latency(latency);
    for pool in &config.pools {
        seed_pool(&cloud, &pool.name, hosts, reservations);
        info!(pool = %pool.name, hosts, reservations, "[SIM] pool seeded");
    }

    let cloud = Arc::new(cloud);
    let reconciler = Arc::new(Reconciler::new(config, cloud.clone(), cloud.clone())?);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(reconciler.run(interval, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    let stats = cloud.stats();
    info!(
        created = stats.nodes_created,
        started = stats.nodes_started,
        hosts_deleted = stats.hosts_deleted,
        app_groups_deleted = stats.app_groups_deleted,
        "[SIM] simulation stopped"
    );
    Ok(())
}

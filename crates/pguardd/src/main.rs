//! pguardd - The pguard background service
//!
//! This is the main entry point for the pguardd service.
//! It wires together all the components:
//! - Configuration loading
//! - Audit store initialization
//! - dnsmasq enforcement point
//! - Grant manager

use anyhow::{Context, Result};
use clap::Parser;
use pguard_config::{Policy, load_config};
use pguard_core::{GrantEvent, GrantManager};
use pguard_enforce_api::EnforcementPoint;
use pguard_enforce_dnsmasq::DnsmasqEnforcer;
use pguard_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use pguard_util::{
    DATABASE_FILENAME, default_config_path, format_duration, is_mock_time_active,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// pguardd - Temporary exceptions to a DNS blocklist
#[derive(Parser, Debug)]
#[command(name = "pguardd")]
#[command(about = "Grants time-limited exceptions to a DNS blocklist", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/pguard/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set PGUARD_DATA_DIR env var)
    #[arg(short, long, env = "PGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    manager: GrantManager,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            conditional = policy.domains.conditional().len(),
            always_blocked = policy.domains.always_blocked().len(),
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;
        store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
            conditional_count: policy.domains.conditional().len(),
            always_blocked_count: policy.domains.always_blocked().len(),
        }))?;

        let manager = build_manager(&policy, store.clone());

        Ok(Self { manager, store })
    }

    async fn run(self) -> Result<()> {
        if let Err(e) = self.manager.initialize().await {
            // Not fatal: the next grant, revoke or expiry pushes the full list again
            warn!(error = %e, "Initial blocklist sync failed");
        }

        let event_logger = tokio::spawn(log_events(self.manager.subscribe()));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP dumps the active grants to the log
                _ = sighup.recv() => {
                    log_status(&self.manager);
                }
            }
        }

        info!("Shutting down pguardd");

        // Re-block everything before exiting
        let outcome = self.manager.shutdown().await;
        if let Err(e) = &outcome.sync {
            warn!(error = %e, "Final blocklist sync failed");
        }
        event_logger.abort();

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!(revoked = outcome.revoked.len(), "Shutdown complete");
        Ok(())
    }
}

fn build_manager(policy: &Policy, store: Arc<dyn Store>) -> GrantManager {
    let enforcer = DnsmasqEnforcer::from_config(&policy.enforcement);

    if !enforcer.is_healthy() {
        warn!(
            hosts_path = %enforcer.hosts_path().display(),
            "Blocklist directory does not exist; syncs will fail until it does"
        );
    }

    GrantManager::from_policy(policy, Arc::new(enforcer), store)
}

async fn log_events(mut events: broadcast::Receiver<GrantEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_reblock() => info!(event = ?event, "Block restored"),
            Ok(event) => debug!(event = ?event, "Grant event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Grant event logger fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_status(manager: &GrantManager) {
    let status = manager.status();
    let now = pguard_util::now();

    info!(
        active_grants = status.grants.len(),
        blocked = status.blocked_count,
        force_blocked = ?status.force_blocked_devices,
        "Status"
    );
    for grant in &status.grants {
        info!(
            grant_id = %grant.id,
            domains = ?grant.members,
            device = %grant.requester.device_id,
            remaining = %format_duration(grant.remaining(now).to_std().unwrap_or_default()),
            "Active grant"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "pguardd starting");
    if is_mock_time_active() {
        warn!("Mock time is active; grant timestamps follow the shifted clock");
    }

    let service = Service::new(&args)?;
    service.run().await
}

//! SPB Sync Daemon - Background form synchronization service
//!
//! This binary runs next to the field application and handles:
//! - One-time migration of the legacy key-value form store
//! - Reachability probing of the SPB service
//! - Draining the pending form queue (on reconnect, on a timer, with retries)
//! - Keeping the local SPB list cache fresh
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the HTTP adapters and the SQLite store into a
//! [`FormSyncEngine`] and a [`SyncController`], starts their background
//! tasks, then waits on a `CancellationToken` that is triggered on receipt
//! of SIGTERM or SIGINT.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use spbsync_api::{ApiClient, HttpConnectivityProbe, SpbApiProvider};
use spbsync_cache::{DatabasePool, JsonKvStore, SqliteFormRepository, SqliteSpbCache};
use spbsync_core::config::{Config, MigrationConfig};
use spbsync_core::domain::FetchScope;
use spbsync_core::ports::{IConnectivityMonitor, IFormRepository};
use spbsync_sync::{
    EngineConfig, FormSyncEngine, GenerationMigrationService, MigrationReport, SyncController,
    SyncPhase,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "SPBSYNC_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the store and the shutdown token
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    repository: Arc<SqliteFormRepository>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database named in `config`, creating its directory
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_path = &config.storage.database;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let db_pool = DatabasePool::new(db_path)
            .await
            .context("Failed to open database")?;
        let repository = Arc::new(SqliteFormRepository::new(db_pool.pool().clone()));
        info!(database = %db_path.display(), "Opened form store");

        Ok(Self {
            config,
            db_pool,
            repository,
            shutdown,
        })
    }

    /// Runs until the shutdown token fires
    ///
    /// 1. Migrates the legacy store, if one is present
    /// 2. Builds the HTTP adapters, the engine and the list controller
    /// 3. Starts the probe, the engine tasks and the controller listener
    /// 4. Stops everything in reverse order on shutdown
    async fn run(&self) -> Result<()> {
        let repository: Arc<dyn IFormRepository> = self.repository.clone();
        match migrate_legacy(&self.config.migration, Arc::clone(&repository)).await {
            Ok(Some(report)) => info!(
                migrated = report.migrated,
                kept = report.kept,
                skipped = report.skipped,
                "Legacy forms migrated"
            ),
            Ok(None) => debug!("No legacy migration needed"),
            // Legacy data stays in place and the migration is retried next start
            Err(e) => warn!(error = %format!("{e:#}"), "Legacy migration failed, continuing"),
        }

        let probe = Arc::new(
            HttpConnectivityProbe::from_config(&self.config.api.base_url, &self.config.connectivity)
                .context("Failed to build connectivity probe")?,
        );
        let client = ApiClient::from_config(&self.config.api).context("Failed to build API client")?;
        let provider = Arc::new(SpbApiProvider::new(client));

        let engine = FormSyncEngine::new(
            repository,
            provider.clone(),
            probe.clone(),
            EngineConfig::from_config(&self.config),
        );

        let scope = FetchScope::new(&self.config.scope.user_id, &self.config.scope.vendor_code);
        let controller = Arc::new(SyncController::new(
            engine.clone(),
            provider,
            Arc::new(SqliteSpbCache::new(self.db_pool.pool().clone())),
            scope,
            self.config.scope.page_size,
        ));

        // Listeners take the offline baseline first, so the probe's first
        // successful tick triggers the catch-up sync and list refresh.
        engine.start();
        let controller_task =
            controller.spawn_connectivity_listener(probe.subscribe(), self.shutdown.child_token());
        let status_task = spawn_status_reporter(engine.clone(), self.shutdown.child_token());
        let probe_task = {
            let probe = Arc::clone(&probe);
            let cancel = self.shutdown.child_token();
            tokio::spawn(async move { probe.run(cancel).await })
        };

        controller.load(false).await;
        info!(
            status = %controller.state().status,
            documents = controller.state().documents.len(),
            "SPB list loaded"
        );

        self.shutdown.cancelled().await;
        info!("Shutdown signal received");

        for (name, task) in [
            ("probe", probe_task),
            ("controller", controller_task),
            ("status", status_task),
        ] {
            join_task(name, task).await;
        }
        engine.stop().await;

        match engine.stats().await {
            Ok(stats) => info!(
                pending = stats.pending,
                failed = stats.failed,
                synced = stats.synced,
                "Queue state at shutdown"
            ),
            Err(e) => warn!(error = %e, "Failed to read queue state at shutdown"),
        }

        Ok(())
    }
}

// ============================================================================
// Legacy migration
// ============================================================================

/// Migrates the legacy key-value store into `repository` when needed
///
/// Returns `Ok(None)` when there is no legacy store file or its completion
/// marker is already set. With `auto_cleanup` the migrated legacy entries are deleted
/// once the copy has been verified.
async fn migrate_legacy(
    config: &MigrationConfig,
    repository: Arc<dyn IFormRepository>,
) -> Result<Option<MigrationReport>> {
    let path = &config.legacy_store;
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "No legacy store present");
        return Ok(None);
    }

    let store = JsonKvStore::open(path)
        .await
        .with_context(|| format!("Failed to open legacy store {}", path.display()))?;
    let service = GenerationMigrationService::new(Arc::new(store), repository, config.into());

    if !service.needs_migration().await? {
        return Ok(None);
    }

    info!(path = %path.display(), "Migrating legacy form store");
    let report = service.migrate().await?;

    if config.auto_cleanup {
        let removed = service.cleanup().await?;
        info!(removed, "Removed migrated legacy entries");
    }

    Ok(Some(report))
}

// ============================================================================
// Status reporting
// ============================================================================

/// Logs every phase change of the engine, with queue counts as JSON
fn spawn_status_reporter(engine: FormSyncEngine, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut phases = engine.status().subscribe_phase();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = phases.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let phase = *phases.borrow_and_update();
                    if phase == SyncPhase::Syncing {
                        continue;
                    }

                    let stats = match engine.stats().await {
                        Ok(stats) => stats,
                        Err(e) => {
                            warn!(error = %e, "Failed to read queue stats");
                            continue;
                        }
                    };
                    let summary = serde_json::json!({
                        "phase": phase.to_string(),
                        "pending": stats.pending,
                        "failed": stats.failed,
                        "synced": stats.synced,
                        "sync_percentage": stats.sync_percentage,
                        "last_error": engine.status().last_error(),
                    })
                    .to_string();

                    match phase {
                        SyncPhase::Failed => warn!(summary = %summary, "Sync status changed"),
                        _ => info!(summary = %summary, "Sync status changed"),
                    }
                }
            }
        }
    })
}

async fn join_task(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// `$SPBSYNC_CONFIG`, or the platform default
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads and validates the configuration; a missing file means defaults
fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let list: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration {}: {}", path.display(), list.join("; "));
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured level
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(config: &Config) {
    let filter = log_filter(&config.logging.level);
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = load_config(&config_path)?;
    init_tracing(&config);

    info!(config_path = %config_path.display(), "SPB Sync daemon starting (spbsyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("SPB Sync daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "SPB Sync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

//! CLI subcommands
//!
//! Every command receives a [`CliContext`] carrying the global flags. The
//! context loads the configuration and builds the store, the HTTP adapters
//! and the sync engine on demand, so read-only commands never touch the
//! network.

pub mod completions;
pub mod config;
pub mod forms;
pub mod list;
pub mod migrate;
pub mod save;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use spbsync_api::{ApiClient, HttpConnectivityProbe, SpbApiProvider};
use spbsync_cache::{DatabasePool, SqliteFormRepository};
use spbsync_core::config::Config;
use spbsync_core::domain::FormRecord;
use spbsync_core::ports::{ConnectivityState, IConnectivityMonitor};
use spbsync_sync::{EngineConfig, FormSyncEngine};
use tokio::sync::watch;
use tracing::info;

use crate::output::{format_epoch, get_formatter, OutputFormat, OutputFormatter};

/// Global flags shared by all commands
#[derive(Debug, Clone)]
pub struct CliContext {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// `--config` if given, otherwise the platform default
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the configuration; a missing file means defaults
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        let config =
            Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
        info!(config_path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Opens (and migrates) the form database named in `config`
    pub async fn open_database(&self, config: &Config) -> Result<DatabasePool> {
        let db_path = &config.storage.database;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))
    }

    /// Builds an engine over the local store and the remote service
    ///
    /// Reachability is probed once up front so the engine sees the real
    /// connectivity state. Background tasks are not started.
    pub async fn build_engine(&self, config: &Config, pool: &DatabasePool) -> Result<Engine> {
        let repository = Arc::new(SqliteFormRepository::new(pool.pool().clone()));
        let probe = Arc::new(
            HttpConnectivityProbe::from_config(&config.api.base_url, &config.connectivity)
                .context("Failed to build connectivity probe")?,
        );
        let online = probe.probe_once().await.is_connected();

        let client = ApiClient::from_config(&config.api).context("Failed to build API client")?;
        let provider = Arc::new(SpbApiProvider::new(client));

        let engine = FormSyncEngine::new(
            repository,
            provider.clone(),
            probe,
            EngineConfig::from_config(config),
        );

        Ok(Engine {
            engine,
            provider,
            online,
        })
    }

    /// Engine for local-only operations; it always reports offline, so
    /// nothing it does reaches the network
    pub fn offline_engine(&self, config: &Config, pool: &DatabasePool) -> Result<FormSyncEngine> {
        let repository = Arc::new(SqliteFormRepository::new(pool.pool().clone()));
        let client = ApiClient::from_config(&config.api).context("Failed to build API client")?;

        Ok(FormSyncEngine::new(
            repository,
            Arc::new(SpbApiProvider::new(client)),
            Arc::new(Offline::default()),
            EngineConfig::from_config(config),
        ))
    }
}

/// Connectivity monitor pinned to offline
struct Offline {
    state: watch::Sender<ConnectivityState>,
}

impl Default for Offline {
    fn default() -> Self {
        Self {
            state: watch::channel(ConnectivityState::offline()).0,
        }
    }
}

#[async_trait::async_trait]
impl IConnectivityMonitor for Offline {
    async fn check(&self) -> ConnectivityState {
        ConnectivityState::offline()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}

/// An engine wired to the remote service, plus what was learned building it
pub struct Engine {
    pub engine: FormSyncEngine,
    pub provider: Arc<SpbApiProvider>,
    pub online: bool,
}

// ============================================================================
// Shared record rendering
// ============================================================================

/// Queue position of a record under the configured retry budget
pub fn record_state(record: &FormRecord, max_retry_attempts: u32) -> &'static str {
    if record.is_synced() {
        "synced"
    } else if record.is_failed(max_retry_attempts) {
        "failed"
    } else {
        "pending"
    }
}

pub fn record_json(record: &FormRecord, max_retry_attempts: u32) -> serde_json::Value {
    serde_json::json!({
        "record_key": record.record_key().as_str(),
        "status": record.status().as_code(),
        "state": record_state(record, max_retry_attempts),
        "created_by": record.created_by(),
        "latitude": record.latitude(),
        "longitude": record.longitude(),
        "reason": record.reason(),
        "resource_changed": record.resource_changed(),
        "timestamp": record.timestamp(),
        "is_synced": record.is_synced(),
        "retry_count": record.retry_count(),
        "last_error": record.last_error(),
        "updated_at": record.updated_at(),
    })
}

pub fn record_row(record: &FormRecord, max_retry_attempts: u32) -> Vec<String> {
    vec![
        record.record_key().to_string(),
        record.status().to_string(),
        record_state(record, max_retry_attempts).to_string(),
        format!("{}/{}", record.retry_count(), max_retry_attempts),
        format_epoch(record.updated_at()),
        crate::output::truncate(record.last_error().unwrap_or("-"), 48),
    ]
}

pub const RECORD_HEADERS: [&str; 6] = ["KEY", "STATUS", "STATE", "RETRIES", "UPDATED", "LAST ERROR"];

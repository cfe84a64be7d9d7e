//! Configuration module for SPB Sync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for SPB Sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub migration: MigrationConfig,
    pub storage: StorageConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
    pub scope: ScopeConfig,
}

/// Remote SPB service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the SPB service, without trailing slash.
    pub base_url: String,
    /// Path of the adjust (submission) endpoint, appended to `base_url`.
    pub adjust_path: String,
    /// Optional bearer token sent with every request.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Form synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Automatic attempts before a record is considered failed.
    pub max_retry_attempts: u32,
    /// Base delay of the exponential backoff, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Seconds between silent background sweeps of the pending queue.
    pub sweep_interval_secs: u64,
}

/// Storage-generation migration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Number of records compared against the source after migrating.
    pub verify_sample_size: usize,
    /// Fraction of the sample that must match, in `0.0..=1.0`.
    pub verify_threshold: f64,
    /// Delete legacy keys right after a verified migration.
    pub auto_cleanup: bool,
    /// JSON file holding the legacy key-value store.
    pub legacy_store: PathBuf,
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database.
    pub database: PathBuf,
}

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Path probed on the API host, appended to `api.base_url`.
    pub probe_path: String,
    /// Seconds between probes.
    pub probe_interval_secs: u64,
    /// Probe request timeout in seconds.
    pub probe_timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Which user and vendor the SPB list is fetched for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub user_id: String,
    pub vendor_code: String,
    /// Rows per page in list views.
    pub page_size: usize,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/spbsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("spbsync")
            .join("config.yaml")
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ConnectivityConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("spbsync")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            adjust_path: "/spb/adjust".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_backoff_ms: 5_000,
            sweep_interval_secs: 15 * 60,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            verify_sample_size: 10,
            verify_threshold: 0.8,
            auto_cleanup: false,
            legacy_store: data_dir().join("legacy_store.json"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("forms.db"),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_path: "/health".to_string(),
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            vendor_code: String::new(),
            page_size: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_retry_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- api ---
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.api.base_url),
            });
        }
        if !self.api.adjust_path.starts_with('/') {
            errors.push(ValidationError {
                field: "api.adjust_path".into(),
                message: "must start with '/'".into(),
            });
        }
        positive(
            &mut errors,
            "api.request_timeout_secs",
            self.api.request_timeout_secs,
        );

        // --- sync ---
        positive(
            &mut errors,
            "sync.max_retry_attempts",
            u64::from(self.sync.max_retry_attempts),
        );
        positive(
            &mut errors,
            "sync.initial_backoff_ms",
            self.sync.initial_backoff_ms,
        );
        positive(
            &mut errors,
            "sync.sweep_interval_secs",
            self.sync.sweep_interval_secs,
        );

        // --- migration ---
        positive(
            &mut errors,
            "migration.verify_sample_size",
            self.migration.verify_sample_size as u64,
        );
        if !(0.0..=1.0).contains(&self.migration.verify_threshold) {
            errors.push(ValidationError {
                field: "migration.verify_threshold".into(),
                message: "must be in range 0.0..=1.0".into(),
            });
        }

        // --- connectivity ---
        positive(
            &mut errors,
            "connectivity.probe_interval_secs",
            self.connectivity.probe_interval_secs,
        );
        positive(
            &mut errors,
            "connectivity.probe_timeout_secs",
            self.connectivity.probe_timeout_secs,
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- scope ---
        positive(&mut errors, "scope.page_size", self.scope.page_size as u64);

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use spbsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_base_url("https://spb.example.com/api")
///     .sync_max_retry_attempts(5)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- api ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn api_adjust_path(mut self, path: impl Into<String>) -> Self {
        self.config.api.adjust_path = path.into();
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api.token = Some(token.into());
        self
    }

    pub fn api_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_max_retry_attempts(mut self, n: u32) -> Self {
        self.config.sync.max_retry_attempts = n;
        self
    }

    pub fn sync_initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.sync.initial_backoff_ms = ms;
        self
    }

    pub fn sync_sweep_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.sweep_interval_secs = seconds;
        self
    }

    // --- migration ---

    pub fn migration_verify_sample_size(mut self, n: usize) -> Self {
        self.config.migration.verify_sample_size = n;
        self
    }

    pub fn migration_verify_threshold(mut self, threshold: f64) -> Self {
        self.config.migration.verify_threshold = threshold;
        self
    }

    pub fn migration_auto_cleanup(mut self, enabled: bool) -> Self {
        self.config.migration.auto_cleanup = enabled;
        self
    }

    pub fn migration_legacy_store(mut self, path: PathBuf) -> Self {
        self.config.migration.legacy_store = path;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- connectivity ---

    pub fn connectivity_probe_path(mut self, path: impl Into<String>) -> Self {
        self.config.connectivity.probe_path = path.into();
        self
    }

    pub fn connectivity_probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_interval_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- scope ---

    pub fn scope(mut self, user_id: impl Into<String>, vendor_code: impl Into<String>) -> Self {
        self.config.scope.user_id = user_id.into();
        self.config.scope.vendor_code = vendor_code.into();
        self
    }

    pub fn scope_page_size(mut self, n: usize) -> Self {
        self.config.scope.page_size = n;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

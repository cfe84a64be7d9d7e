//! Config command - View and manage SPB Sync configuration
//!
//! Provides the `spbsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use spbsync_core::config::Config;

use super::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.max_retry_attempts")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx).await,
            ConfigCommand::Set { key, value } => self.execute_set(key, value, ctx).await,
            ConfigCommand::Validate => self.execute_validate(ctx).await,
        }
    }

    /// Prints the effective configuration; the API token is masked
    async fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();

        let config_path = ctx.config_path();
        let mut config = ctx.load_config()?;
        if config.api.token.is_some() {
            config.api.token = Some("********".to_string());
        }

        info!(config_path = %config_path.display(), "Showing configuration");

        if ctx.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;

            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    /// Sets one value using dot-notation and saves the file
    async fn execute_set(&self, key: &str, value: &str, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();

        let config_path = ctx.config_path();
        let mut config = ctx.load_config()?;

        info!(key = %key, value = %value, "Setting configuration value");

        match apply_config_value(&mut config, key, value) {
            Ok(()) => {
                // Validate the new config before saving
                let validation_errors = config.validate();
                if !validation_errors.is_empty() {
                    let error_msgs: Vec<String> = validation_errors
                        .iter()
                        .map(|e| format!("{}: {}", e.field, e.message))
                        .collect();

                    if ctx.format.is_json() {
                        let json = serde_json::json!({
                            "success": false,
                            "key": key,
                            "value": value,
                            "errors": error_msgs,
                        });
                        formatter.print_json(&json);
                    } else {
                        formatter.error(&format!(
                            "Invalid value for '{}': {}",
                            key,
                            error_msgs.join("; ")
                        ));
                    }
                    return Ok(());
                }

                // Ensure parent directory exists
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create configuration directory")?;
                }

                // Serialize and save
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
                std::fs::write(&config_path, &yaml)
                    .context("Failed to write configuration file")?;

                if ctx.format.is_json() {
                    let json = serde_json::json!({
                        "success": true,
                        "key": key,
                        "value": value,
                        "config_path": config_path.display().to_string(),
                    });
                    formatter.print_json(&json);
                } else {
                    formatter.success(&format!("Set {} = {}", key, value));
                    formatter.info(&format!("Saved to {}", config_path.display()));
                }
            }
            Err(e) => {
                if ctx.format.is_json() {
                    let json = serde_json::json!({
                        "success": false,
                        "key": key,
                        "value": value,
                        "error": e.to_string(),
                    });
                    formatter.print_json(&json);
                } else {
                    formatter.error(&format!("Failed to set '{}': {}", key, e));
                    formatter.info("");
                    formatter.info("Supported keys:");
                    for (key, help) in SUPPORTED_KEYS {
                        formatter.info(&format!("  {:<36} - {}", key, help));
                    }
                }
            }
        }

        Ok(())
    }

    /// Loads the file strictly and reports every validation error
    async fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();

        let config_path = ctx.config_path();

        // Try to load the config file explicitly (not load_or_default)
        let config = match Config::load(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !config_path.exists() {
                    if ctx.format.is_json() {
                        let json = serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["Configuration file not found. Using defaults."],
                        });
                        formatter.print_json(&json);
                    } else {
                        formatter.info(&format!(
                            "Configuration file not found at {}",
                            config_path.display()
                        ));
                        formatter.info("Using default configuration. Run 'spbsync config set <key> <value>' to create one.");
                    }
                    return Ok(());
                }

                if ctx.format.is_json() {
                    let json = serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    });
                    formatter.print_json(&json);
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if ctx.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            let json = serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            });
            formatter.print_json(&json);
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

const SUPPORTED_KEYS: [(&str, &str); 20] = [
    ("api.base_url", "SPB service base URL"),
    ("api.adjust_path", "Submission endpoint path"),
    ("api.token", "Bearer token (empty or 'none' to clear)"),
    ("api.request_timeout_secs", "Per-request timeout"),
    ("sync.max_retry_attempts", "Automatic attempts per form"),
    ("sync.initial_backoff_ms", "First retry delay"),
    ("sync.sweep_interval_secs", "Seconds between background sweeps"),
    ("migration.verify_sample_size", "Records compared after migrating"),
    ("migration.verify_threshold", "Required match fraction (0.0-1.0)"),
    ("migration.auto_cleanup", "Delete legacy entries after migrating"),
    ("migration.legacy_store", "Legacy key-value store file"),
    ("storage.database", "SQLite database path"),
    ("connectivity.probe_path", "Path probed for reachability"),
    ("connectivity.probe_interval_secs", "Seconds between probes"),
    ("connectivity.probe_timeout_secs", "Probe timeout"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "Emit JSON log lines"),
    ("scope.user_id", "Driver the SPB list is fetched for"),
    ("scope.vendor_code", "Vendor the SPB list is fetched for"),
    ("scope.page_size", "Rows per page in list views"),
];

/// Apply a dot-notation key/value pair to a Config struct
///
/// Keys are `<section>.<field>` for the api, sync, migration, storage,
/// connectivity, logging and scope sections.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- api ---
        "api.base_url" => config.api.base_url = value.trim_end_matches('/').to_string(),
        "api.adjust_path" => config.api.adjust_path = value.to_string(),
        "api.token" => {
            config.api.token = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "api.request_timeout_secs" => {
            config.api.request_timeout_secs = parse(key, value)?;
        }

        // --- sync ---
        "sync.max_retry_attempts" => config.sync.max_retry_attempts = parse(key, value)?,
        "sync.initial_backoff_ms" => config.sync.initial_backoff_ms = parse(key, value)?,
        "sync.sweep_interval_secs" => config.sync.sweep_interval_secs = parse(key, value)?,

        // --- migration ---
        "migration.verify_sample_size" => {
            config.migration.verify_sample_size = parse(key, value)?;
        }
        "migration.verify_threshold" => {
            config.migration.verify_threshold = value
                .parse::<f64>()
                .context("Expected a number for migration.verify_threshold")?;
        }
        "migration.auto_cleanup" => {
            config.migration.auto_cleanup = value
                .parse::<bool>()
                .context("Expected true or false for migration.auto_cleanup")?;
        }
        "migration.legacy_store" => config.migration.legacy_store = PathBuf::from(value),

        // --- storage ---
        "storage.database" => config.storage.database = PathBuf::from(value),

        // --- connectivity ---
        "connectivity.probe_path" => config.connectivity.probe_path = value.to_string(),
        "connectivity.probe_interval_secs" => {
            config.connectivity.probe_interval_secs = parse(key, value)?;
        }
        "connectivity.probe_timeout_secs" => {
            config.connectivity.probe_timeout_secs = parse(key, value)?;
        }

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => {
            config.logging.json = value
                .parse::<bool>()
                .context("Expected true or false for logging.json")?;
        }

        // --- scope ---
        "scope.user_id" => config.scope.user_id = value.to_string(),
        "scope.vendor_code" => config.scope.vendor_code = value.to_string(),
        "scope.page_size" => config.scope.page_size = parse(key, value)?,

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Expected a positive integer for {key}"))
}

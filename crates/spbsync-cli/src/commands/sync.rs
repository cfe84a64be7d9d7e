//! Sync command - Deliver queued forms to the SPB service
//!
//! Provides the `spbsync sync` CLI command which:
//! 1. Loads configuration and opens the form database
//! 2. Probes the service and wires the HTTP adapters into the engine
//! 3. Syncs one form, the pending queue, or the exhausted forms
//! 4. Displays the pass report

use anyhow::{Context, Result};
use clap::Args;
use spbsync_core::domain::RecordKey;
use spbsync_sync::{SyncAllOutcome, SyncReport};
use tracing::info;

use super::save::describe;
use super::CliContext;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Sync a single form instead of the whole queue
    #[arg(long, conflicts_with = "retry_failed")]
    pub key: Option<String>,

    /// Reset exhausted forms and retry them now
    #[arg(long)]
    pub retry_failed: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = ctx.open_database(&config).await?;
        let built = ctx.build_engine(&config, &pool).await?;
        info!(online = built.online, base_url = %config.api.base_url, "Probed SPB service");

        if let Some(key) = &self.key {
            let key = RecordKey::new(key).context("Invalid record key")?;
            let outcome = built.engine.sync_form(&key).await;
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "record_key": key.as_str(),
                    "success": outcome.is_success(),
                    "outcome": describe(&outcome),
                }));
            } else if outcome.is_success() {
                formatter.success(&format!("{key}: {}", describe(&outcome)));
            } else {
                formatter.error(&format!("{key}: {}", describe(&outcome)));
            }
            return Ok(());
        }

        if !ctx.format.is_json() {
            formatter.info("Starting synchronization...");
        }

        let outcome = if self.retry_failed {
            built.engine.retry_failed_now().await?
        } else {
            built.engine.sync_all_pending(false).await
        };

        match outcome {
            SyncAllOutcome::Completed(report) => show_report(ctx, &*formatter, &report),
            SyncAllOutcome::Offline => {
                formatter.warn("SPB service unreachable; forms stay queued");
            }
            SyncAllOutcome::Busy => formatter.warn("Another sync pass is running"),
            SyncAllOutcome::Failed(message) => {
                anyhow::bail!("Failed to read the pending queue: {message}")
            }
        }
        Ok(())
    }
}

fn show_report(ctx: &CliContext, formatter: &dyn OutputFormatter, report: &SyncReport) {
    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "total": report.total,
            "synced": report.synced,
            "failed": report.failed,
            "skipped": report.skipped,
            "errors": report.errors,
            "duration_ms": report.duration_ms,
        }));
        return;
    }

    if report.total == 0 {
        formatter.success("Nothing to sync");
        return;
    }

    formatter.success(&format!(
        "Sync completed in {}",
        format_duration(report.duration_ms)
    ));
    formatter.info(&format!("Synced:  {}", plural(report.synced, "form")));
    if report.skipped > 0 {
        formatter.info(&format!("Skipped: {}", plural(report.skipped, "form")));
    }

    if !report.errors.is_empty() {
        formatter.error(&format!("{} failed:", plural(report.failed, "form")));
        for err in &report.errors {
            formatter.info(&format!("  - {}", err));
        }
    }
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

fn plural(count: usize, noun: &str) -> String {
    format!("{count} {noun}{}", if count == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1500), "1.5s");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "form"), "1 form");
        assert_eq!(plural(3, "form"), "3 forms");
    }
}

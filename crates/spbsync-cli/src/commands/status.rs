//! Status command - Display form queue status
//!
//! Provides the `spbsync status` CLI command which:
//! 1. Shows queue counts (total, synced, pending, failed) and sync percentage
//! 2. Shows the retry policy in effect
//! 3. Lists failed forms with their last error

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{record_row, CliContext, RECORD_HEADERS};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only print the counts
    #[arg(long)]
    pub brief: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;

        let db_path = &config.storage.database;
        if !db_path.exists() {
            formatter.error("No form database found. Save a form or run 'spbsync migrate' first.");
            return Ok(());
        }

        let pool = ctx.open_database(&config).await?;
        let engine = ctx.offline_engine(&config, &pool)?;
        let max = config.sync.max_retry_attempts;

        let stats = engine.stats().await.context("Failed to read queue stats")?;
        info!(total = stats.total, "Showing queue status");

        if ctx.format.is_json() {
            let failed: Vec<serde_json::Value> = if self.brief {
                Vec::new()
            } else {
                engine
                    .failed_forms()
                    .await?
                    .iter()
                    .map(|r| super::record_json(r, max))
                    .collect()
            };
            formatter.print_json(&serde_json::json!({
                "database": db_path.display().to_string(),
                "total": stats.total,
                "synced": stats.synced,
                "pending": stats.pending,
                "failed": stats.failed,
                "sync_percentage": stats.sync_percentage,
                "max_retry_attempts": max,
                "initial_backoff_ms": config.sync.initial_backoff_ms,
                "failed_forms": failed,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "SPB Sync Status - {:.1}% synced",
            stats.sync_percentage
        ));
        formatter.info("");
        formatter.info(&format!("Total forms:  {}", stats.total));
        formatter.info(&format!("Synced:       {}", stats.synced));
        formatter.info(&format!("Pending:      {}", stats.pending));
        formatter.info(&format!("Failed:       {}", stats.failed));

        if self.brief {
            return Ok(());
        }

        formatter.info("");
        formatter.info(&format!(
            "Retry policy: {} attempts, backoff from {} ms doubling per attempt",
            max, config.sync.initial_backoff_ms
        ));

        if stats.failed > 0 {
            let failed = engine.failed_forms().await?;
            formatter.info("");
            formatter.warn(&format!(
                "{} form(s) exhausted their retries. Run 'spbsync sync --retry-failed' to try again.",
                failed.len()
            ));
            let rows: Vec<Vec<String>> = failed.iter().map(|r| record_row(r, max)).collect();
            formatter.table(&RECORD_HEADERS, &rows);
        }

        Ok(())
    }
}

//! Forms command - Inspect and maintain stored form records
//!
//! Provides the `spbsync forms` CLI subcommands:
//! - `list`  - all records, or only the pending / failed queue
//! - `show`  - one record with its sync metadata
//! - `reset` - re-enable automatic retries for exhausted records
//! - `clear` - delete every stored record

use anyhow::{Context, Result};
use clap::Subcommand;
use spbsync_core::domain::RecordKey;
use spbsync_sync::FormSyncEngine;
use tracing::info;

use super::{record_json, record_row, CliContext, RECORD_HEADERS};
use crate::output::{format_epoch, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum FormsCommand {
    /// List stored forms
    List {
        /// Only forms still eligible for automatic retry
        #[arg(long, conflicts_with = "failed")]
        pending: bool,
        /// Only forms that exhausted their retries
        #[arg(long)]
        failed: bool,
    },
    /// Show one form
    Show {
        /// Record key (SPB number)
        key: String,
    },
    /// Reset the retry counter of a failed form
    Reset {
        /// Record key (SPB number)
        #[arg(required_unless_present = "all")]
        key: Option<String>,
        /// Reset every failed form
        #[arg(long, conflicts_with = "key")]
        all: bool,
    },
    /// Delete every stored form
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

impl FormsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = ctx.open_database(&config).await?;
        let engine = ctx.offline_engine(&config, &pool)?;
        let max = config.sync.max_retry_attempts;

        match self {
            FormsCommand::List { pending, failed } => {
                list(&engine, ctx, &*formatter, max, *pending, *failed).await
            }
            FormsCommand::Show { key } => show(&engine, ctx, &*formatter, max, key).await,
            FormsCommand::Reset { key, all } => {
                reset(&engine, ctx, &*formatter, key.as_deref(), *all).await
            }
            FormsCommand::Clear { yes } => clear(&engine, ctx, &*formatter, *yes).await,
        }
    }
}

async fn list(
    engine: &FormSyncEngine,
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    max: u32,
    pending: bool,
    failed: bool,
) -> Result<()> {
    let (label, records) = if pending {
        ("pending", engine.pending_forms().await?)
    } else if failed {
        ("failed", engine.failed_forms().await?)
    } else {
        ("stored", engine.list_forms().await?)
    };

    if ctx.format.is_json() {
        let json: Vec<serde_json::Value> = records.iter().map(|r| record_json(r, max)).collect();
        formatter.print_json(&serde_json::Value::Array(json));
        return Ok(());
    }

    if records.is_empty() {
        formatter.success(&format!("No {label} forms"));
        return Ok(());
    }

    formatter.success(&format!("{} {label} form(s)", records.len()));
    formatter.info("");
    let rows: Vec<Vec<String>> = records.iter().map(|r| record_row(r, max)).collect();
    formatter.table(&RECORD_HEADERS, &rows);
    Ok(())
}

async fn show(
    engine: &FormSyncEngine,
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    max: u32,
    key: &str,
) -> Result<()> {
    let key = RecordKey::new(key).context("Invalid record key")?;
    let Some(record) = engine.get_form(&key).await? else {
        formatter.error(&format!("No form stored for {key}"));
        return Ok(());
    };

    if ctx.format.is_json() {
        formatter.print_json(&record_json(&record, max));
        return Ok(());
    }

    formatter.success(&format!("Form {}", record.record_key()));
    formatter.info("");
    formatter.info(&format!("Status:           {}", record.status()));
    formatter.info(&format!("State:            {}", super::record_state(&record, max)));
    formatter.info(&format!("Created by:       {}", record.created_by()));
    formatter.info(&format!(
        "Location:         {}, {}",
        record.latitude(),
        record.longitude()
    ));
    if let Some(reason) = record.reason() {
        formatter.info(&format!("Reason:           {reason}"));
    }
    formatter.info(&format!(
        "Resource changed: {}",
        if record.resource_changed() { "yes" } else { "no" }
    ));
    formatter.info(&format!("Event time:       {}", format_epoch(record.timestamp())));
    formatter.info(&format!("Saved:            {}", format_epoch(record.created_at())));
    formatter.info(&format!("Updated:          {}", format_epoch(record.updated_at())));
    formatter.info(&format!("Retries:          {}/{}", record.retry_count(), max));
    if let Some(error) = record.last_error() {
        formatter.info("");
        formatter.error(error);
    }
    Ok(())
}

async fn reset(
    engine: &FormSyncEngine,
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    key: Option<&str>,
    all: bool,
) -> Result<()> {
    if all {
        let reset = engine.reset_all_failed().await?;
        info!(reset, "Reset failed forms");
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({ "reset": reset }));
        } else {
            formatter.success(&format!("Reset {reset} failed form(s)"));
        }
        return Ok(());
    }

    let Some(key) = key else {
        formatter.error("Give a record key or --all");
        return Ok(());
    };
    let key = RecordKey::new(key).context("Invalid record key")?;
    let found = engine.reset_retry(&key).await?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({ "record_key": key.as_str(), "reset": found }));
    } else if found {
        formatter.success(&format!("Retries reset for {key}"));
    } else {
        formatter.error(&format!("No form stored for {key}"));
    }
    Ok(())
}

async fn clear(
    engine: &FormSyncEngine,
    ctx: &CliContext,
    formatter: &dyn OutputFormatter,
    yes: bool,
) -> Result<()> {
    if !yes {
        formatter.error("This deletes every stored form, synced or not. Re-run with --yes.");
        return Ok(());
    }

    let deleted = engine.clear_all().await?;
    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({ "deleted": deleted }));
    } else {
        formatter.success(&format!("Deleted {deleted} form(s)"));
    }
    Ok(())
}

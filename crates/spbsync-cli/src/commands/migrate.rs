//! Migrate command - Move legacy key-value forms into the form database

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use spbsync_cache::{JsonKvStore, SqliteFormRepository};
use spbsync_sync::{GenerationMigrationService, MigrationReport};
use tracing::info;

use super::CliContext;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct MigrateCommand {
    /// Only report whether a migration is needed
    #[arg(long, conflicts_with = "cleanup")]
    pub check: bool,

    /// Delete the migrated legacy entries afterwards
    #[arg(long)]
    pub cleanup: bool,
}

impl MigrateCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let legacy_path = &config.migration.legacy_store;

        if !legacy_path.exists() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "legacy_store": legacy_path.display().to_string(),
                    "needs_migration": false,
                }));
            } else {
                formatter.success(&format!(
                    "No legacy store at {}; nothing to migrate",
                    legacy_path.display()
                ));
            }
            return Ok(());
        }

        let store = JsonKvStore::open(legacy_path)
            .await
            .with_context(|| format!("Failed to open legacy store {}", legacy_path.display()))?;
        let pool = ctx.open_database(&config).await?;
        let service = GenerationMigrationService::new(
            Arc::new(store),
            Arc::new(SqliteFormRepository::new(pool.pool().clone())),
            (&config.migration).into(),
        );

        let needed = service.needs_migration().await?;
        if self.check || (!needed && !self.cleanup) {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "legacy_store": legacy_path.display().to_string(),
                    "needs_migration": needed,
                }));
            } else if needed {
                formatter.info("Legacy forms are waiting to be migrated");
            } else {
                formatter.success("Legacy store already migrated");
            }
            return Ok(());
        }

        // Cleanup is only allowed after a verified pass in this process; on an
        // already-migrated store that pass inserts nothing and keeps every row
        info!(path = %legacy_path.display(), "Migrating legacy form store");
        let report = service.migrate().await?;

        let removed = if self.cleanup {
            Some(service.cleanup().await?)
        } else {
            None
        };

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "legacy_store": legacy_path.display().to_string(),
                "report": report_json(&report),
                "removed": removed,
            }));
            return Ok(());
        }

        show_report(&*formatter, &report);
        if let Some(removed) = removed {
            let noun = if removed == 1 { "entry" } else { "entries" };
            formatter.success(&format!("Removed {removed} legacy {noun}"));
        }
        Ok(())
    }
}

fn report_json(report: &MigrationReport) -> serde_json::Value {
    serde_json::json!({
        "total": report.total,
        "migrated": report.migrated,
        "kept": report.kept,
        "skipped": report.skipped,
        "target_rows": report.target_rows,
        "sampled": report.sampled,
        "sample_matched": report.sample_matched,
        "duration_ms": report.duration_ms,
    })
}

fn show_report(formatter: &dyn OutputFormatter, report: &MigrationReport) {
    formatter.success(&format!(
        "Migrated {} of {} legacy forms in {}ms",
        report.migrated, report.total, report.duration_ms
    ));
    if report.kept > 0 {
        formatter.info(&format!(
            "{} forms were already in the form database and kept as stored",
            report.kept
        ));
    }
    if report.skipped > 0 {
        formatter.warn(&format!(
            "{} unreadable entries were left in the legacy store",
            report.skipped
        ));
    }
    formatter.info(&format!(
        "Verified {}/{} sampled records; {} rows in the form database",
        report.sample_matched, report.sampled, report.target_rows
    ));
}

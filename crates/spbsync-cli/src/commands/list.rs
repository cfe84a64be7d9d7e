//! List command - Show the SPB list the driver works from
//!
//! The list is served from the local cache and only fetched from the
//! service when the cache is empty or `--refresh` is given.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use spbsync_api::{ApiClient, SpbApiProvider};
use spbsync_cache::SqliteSpbCache;
use spbsync_core::domain::{FetchScope, SpbDocument};
use spbsync_sync::{ControllerEvent, SortColumn, SortDirection, SyncController, ViewStatus};

use super::CliContext;
use crate::output::format_epoch;

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Case-insensitive text filter
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Sort column (spb, driver, vehicle, destination, status, issued)
    #[arg(long, default_value = "spb")]
    pub sort: SortColumn,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Page to show (1-indexed)
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Rows per page (defaults to scope.page_size)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Fetch from the service even when the cache has data
    #[arg(long)]
    pub refresh: bool,
}

const HEADERS: [&str; 6] = ["SPB", "DRIVER", "VEHICLE", "DESTINATION", "STATUS", "ISSUED"];

impl ListCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = ctx.open_database(&config).await?;

        let client = ApiClient::from_config(&config.api).context("Failed to build API client")?;
        let controller = SyncController::new(
            ctx.offline_engine(&config, &pool)?,
            Arc::new(SpbApiProvider::new(client)),
            Arc::new(SqliteSpbCache::new(pool.pool().clone())),
            FetchScope::new(&config.scope.user_id, &config.scope.vendor_code),
            self.page_size.unwrap_or(config.scope.page_size),
        );

        controller.load(self.refresh).await;

        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        controller
            .dispatch(ControllerEvent::SortBy(self.sort, direction))
            .await;
        if let Some(filter) = &self.filter {
            controller
                .dispatch(ControllerEvent::Filter(filter.clone()))
                .await;
        }
        controller.dispatch(ControllerEvent::GoToPage(self.page)).await;

        let state = controller.state();
        let rows = state.visible();

        if let ViewStatus::LoadFailure(message) = &state.status {
            anyhow::bail!("Failed to load the SPB list: {message}");
        }

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "status": state.status.to_string(),
                "page": state.page,
                "total_pages": state.total_pages(),
                "matching": state.filtered_count(),
                "documents": rows,
            }));
            return Ok(());
        }

        if let ViewStatus::RemoteError(message) = &state.status {
            formatter.warn(&format!("Refresh failed, showing cached list: {message}"));
        }

        if rows.is_empty() {
            formatter.success("No SPB documents");
            return Ok(());
        }

        formatter.success(&format!(
            "Page {}/{} ({} matching)",
            state.page,
            state.total_pages(),
            state.filtered_count()
        ));
        formatter.info("");
        let table: Vec<Vec<String>> = rows.iter().map(document_row).collect();
        formatter.table(&HEADERS, &table);
        Ok(())
    }
}

fn document_row(doc: &SpbDocument) -> Vec<String> {
    vec![
        doc.spb_number.clone(),
        doc.driver_name.clone(),
        doc.vehicle_number.clone(),
        doc.destination.clone(),
        doc.status.clone(),
        format_epoch(doc.issued_at),
    ]
}

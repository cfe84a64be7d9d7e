//! Save command - Record a form locally and try to deliver it

use anyhow::Result;
use clap::Args;
use spbsync_core::domain::{FormPayload, FormStatus};
use spbsync_sync::{EngineError, SyncOutcome};

use super::{record_json, CliContext};
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct SaveCommand {
    /// Record key (SPB number)
    pub key: String,

    /// Form status (NEW, ACCEPTED, ISSUE, CANCELLED)
    #[arg(long, short = 's')]
    pub status: FormStatus,

    /// Driver or user submitting the form
    #[arg(long)]
    pub created_by: String,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: String,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: String,

    /// Issue description; required with --status ISSUE
    #[arg(long)]
    pub reason: Option<String>,

    /// Whether the driver or vehicle changed; required with --status ISSUE
    #[arg(long)]
    pub resource_changed: Option<bool>,

    /// Epoch seconds of the field event (defaults to now)
    #[arg(long)]
    pub timestamp: Option<i64>,

    /// Only store the form; leave delivery to the daemon
    #[arg(long)]
    pub no_sync: bool,
}

impl SaveCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let pool = ctx.open_database(&config).await?;
        let max = config.sync.max_retry_attempts;

        let payload = FormPayload {
            status: self.status,
            created_by: self.created_by.clone(),
            latitude: self.lat.clone(),
            longitude: self.lon.clone(),
            reason: self.reason.clone(),
            resource_changed: self.resource_changed,
            timestamp: self.timestamp,
        };

        // The local write never depends on the network
        let local = ctx.offline_engine(&config, &pool)?;
        let record = match local.save_form(&self.key, payload).await {
            Ok(record) => record,
            Err(EngineError::Validation(e)) => anyhow::bail!("Form rejected: {e}"),
            Err(e) => return Err(e.into()),
        };
        let key = record.record_key().clone();

        let outcome = if self.no_sync {
            None
        } else {
            let built = ctx.build_engine(&config, &pool).await?;
            Some(built.engine.sync_form(&key).await)
        };

        if ctx.format.is_json() {
            // Re-read so the output reflects the sync attempt
            let record = local.get_form(&key).await?.unwrap_or(record);
            formatter.print_json(&serde_json::json!({
                "saved": record_json(&record, max),
                "sync": outcome.as_ref().map(describe),
            }));
            return Ok(());
        }

        formatter.success(&format!("Saved {key} ({})", record.status()));
        match outcome {
            None => formatter.info("Delivery left to the background service"),
            Some(outcome) => report(&*formatter, &outcome),
        }
        Ok(())
    }
}

fn report(formatter: &dyn OutputFormatter, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Offline => {
            formatter.warn("Service unreachable; the form stays queued for later delivery")
        }
        SyncOutcome::Failed {
            retry_count,
            message,
            ..
        } => formatter.warn(&format!(
            "Delivery failed (attempt {retry_count}): {message}"
        )),
        SyncOutcome::Invalid(message) => {
            formatter.error(&format!("Stored form is invalid: {message}"))
        }
        other if other.is_success() => formatter.success(&describe(other)),
        other => formatter.info(&describe(other)),
    }
}

/// One-line description of a sync outcome
pub fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced => "Delivered to the server".to_string(),
        SyncOutcome::AlreadySynced => "Already delivered".to_string(),
        SyncOutcome::AlreadyProcessed => {
            "Server had already processed this form; marked as delivered".to_string()
        }
        SyncOutcome::Offline => "Service unreachable".to_string(),
        SyncOutcome::NotFound => "No such form".to_string(),
        SyncOutcome::InFlight => "A sync of this form is already running".to_string(),
        SyncOutcome::Invalid(message) => format!("Invalid form: {message}"),
        SyncOutcome::Failed {
            retry_count,
            message,
            ..
        } => format!("Failed after {retry_count} attempt(s): {message}"),
        SyncOutcome::LocalError(message) => format!("Local store error: {message}"),
    }
}

//! SPB Sync CLI - Command-line interface for the form sync store
//!
//! Provides commands for:
//! - Saving forms and delivering them to the SPB service
//! - Inspecting and maintaining the form queue
//! - Migrating the legacy key-value store
//! - Browsing the cached SPB list

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, forms::FormsCommand,
    list::ListCommand, migrate::MigrateCommand, save::SaveCommand, status::StatusCommand,
    sync::SyncCommand, CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "spbsync", version, about = "Offline-first SPB form sync")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show form queue status
    Status(StatusCommand),
    /// Inspect and maintain stored forms
    #[command(subcommand)]
    Forms(FormsCommand),
    /// Save a form locally and try to deliver it
    Save(SaveCommand),
    /// Deliver queued forms to the SPB service
    Sync(SyncCommand),
    /// Migrate the legacy key-value form store
    Migrate(MigrateCommand),
    /// Show the SPB list
    List(ListCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays parseable
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CliContext {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
        config_path: cli.config,
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Forms(cmd) => cmd.execute(&ctx).await,
        Commands::Save(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Migrate(cmd) => cmd.execute(&ctx).await,
        Commands::List(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_save_with_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "spbsync",
            "save",
            "SPB-1",
            "--status",
            "issue",
            "--created-by",
            "driver-01",
            "--lat",
            "-6.2",
            "--lon",
            "106.8",
            "--reason",
            "ban bocor",
            "--resource-changed",
            "true",
        ])
        .unwrap();
        let Commands::Save(save) = cli.command else {
            panic!("expected save");
        };
        assert_eq!(save.lat, "-6.2");
        assert_eq!(save.resource_changed, Some(true));
        assert!(!save.no_sync);
    }

    #[test]
    fn test_parse_list_sort_column() {
        let cli = Cli::try_parse_from(["spbsync", "--json", "list", "--sort", "driver", "--desc"])
            .unwrap();
        assert!(cli.json);
        let Commands::List(list) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(list.sort, spbsync_sync::SortColumn::Driver);
        assert!(list.desc);
    }

    #[test]
    fn test_sync_key_conflicts_with_retry_failed() {
        let result = Cli::try_parse_from(["spbsync", "sync", "--key", "SPB-1", "--retry-failed"]);
        assert!(result.is_err());
    }
}

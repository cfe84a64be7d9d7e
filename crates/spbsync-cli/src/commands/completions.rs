//! Completions command - Shell completion scripts for `spbsync`
//!
//! Without `--output` the script goes to stdout so it can be piped:
//! `spbsync completions bash > ~/.local/share/bash-completion/completions/spbsync`.
//! With `--output <dir>` it is written to the file name the shell expects
//! (`spbsync.bash`, `_spbsync`, `spbsync.fish`, ...).

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;

use super::CliContext;

const BIN_NAME: &str = "spbsync";

#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script into this directory instead of stdout
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let Some(dir) = &self.output else {
            let mut stdout = io::stdout().lock();
            render(self.shell, &mut stdout);
            stdout.flush().context("Failed to write completions")?;
            return Ok(());
        };

        let path = write_to_dir(self.shell, dir)?;
        let formatter = ctx.formatter();
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "shell": self.shell.to_string(),
                "path": path.display().to_string(),
            }));
        } else {
            formatter.success(&format!(
                "Wrote {} completions to {}",
                self.shell,
                path.display()
            ));
        }
        Ok(())
    }
}

/// Renders the completion script for `shell` into `out`
fn render(shell: Shell, out: &mut dyn Write) {
    clap_complete::generate(shell, &mut crate::Cli::command(), BIN_NAME, out);
}

/// Writes the completion script into `dir`, creating it if needed
fn write_to_dir(shell: Shell, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    clap_complete::generate_to(shell, &mut crate::Cli::command(), BIN_NAME, dir)
        .with_context(|| format!("Failed to write completions to {}", dir.display()))
}

//! Clones command - Inspect and delete simulator clones

use clap::{Args, Subcommand};
use console::style;

use launchpad_simulators::cloner::CLONE_MARKER;

use crate::cli::{output, Cli, OutputFormat, Session};
use crate::exit_codes;

/// Manage simulator clones
#[derive(Debug, Args)]
pub struct ClonesCommand {
    #[command(subcommand)]
    pub action: ClonesAction,
}

#[derive(Debug, Subcommand)]
pub enum ClonesAction {
    /// List simulators that are clones
    List,
    /// Delete every clone
    Delete,
}

impl ClonesCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let session = Session::host_only();

        match self.action {
            ClonesAction::List => {
                let clones: Vec<_> = session
                    .host
                    .registry
                    .list_devices()
                    .await?
                    .into_iter()
                    .filter(|s| s.name().contains(CLONE_MARKER))
                    .collect();

                if cli.format == OutputFormat::Json {
                    let rows: Vec<serde_json::Value> = clones
                        .iter()
                        .map(|s| serde_json::json!({ "name": s.name(), "udid": s.udid(), "os_version": s.os_version() }))
                        .collect();
                    output::json(&rows)?;
                } else if !cli.quiet {
                    for clone in &clones {
                        println!("  {} {}", style(clone.name()).bold(), style(clone.udid()).dim());
                    }
                    if clones.is_empty() {
                        output::info("No clones");
                    }
                }
            }
            ClonesAction::Delete => {
                let deleted = session.host.fleet.delete_all_clones().await?;
                if cli.format == OutputFormat::Json {
                    output::json(&serde_json::json!({ "deleted": deleted }))?;
                } else if !cli.quiet {
                    output::success(&format!("Deleted {} clones", deleted));
                }
            }
        }
        Ok(exit_codes::SUCCESS)
    }
}

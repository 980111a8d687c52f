//! Clean command - Remove build output and clones

use clap::Args;

use launchpad_xcode::artifacts::remove_path;

use crate::cli::{output, Cli, Session};
use crate::exit_codes;

/// Remove derived data and, optionally, clones and reports
#[derive(Debug, Args)]
pub struct CleanCommand {
    /// Also delete every simulator clone
    #[arg(long)]
    pub clones: bool,

    /// Also remove the report output directory
    #[arg(long)]
    pub reports: bool,
}

impl CleanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let session = Session::load(cli, |_| {})?;

        session.builder().clean_derived_data().await;
        if cli.shows_progress() {
            output::success("Removed derived data");
        }

        if self.reports {
            remove_path(&session.config.output_dir)?;
            if cli.shows_progress() {
                output::success("Removed reports");
            }
        }

        if self.clones {
            let deleted = session.host.fleet.delete_all_clones().await?;
            if cli.shows_progress() {
                output::success(&format!("Deleted {} clones", deleted));
            }
        }
        Ok(exit_codes::SUCCESS)
    }
}

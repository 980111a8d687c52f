//! Runtimes command - List installed simulator runtimes

use clap::Args;
use console::style;

use crate::cli::{output, Cli, OutputFormat, Session};
use crate::exit_codes;

/// List installed simulator runtimes
#[derive(Debug, Args)]
pub struct RuntimesCommand {
    /// Only show runtimes that can run simulators
    #[arg(long)]
    pub available: bool,
}

impl RuntimesCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let session = Session::host_only();
        let mut runtimes = session.host.catalog.list_runtimes().await?;
        if self.available {
            runtimes.retain(|r| r.is_available);
        }
        runtimes.sort_by(|a, b| (a.platform(), a.semver()).cmp(&(b.platform(), b.semver())));

        if cli.format == OutputFormat::Json {
            output::json(&runtimes)?;
            return Ok(exit_codes::SUCCESS);
        }

        if !cli.quiet {
            println!("{}", output::header("Runtimes"));
            for rt in &runtimes {
                let availability = if rt.is_available {
                    style("available").green()
                } else {
                    style("unavailable").red()
                };
                println!(
                    "  {} {} ({}) {}",
                    style(rt.platform()).bold(),
                    rt.version,
                    style(&rt.build_version).dim(),
                    availability
                );
                println!("      {}", style(&rt.identifier).dim());
            }
        }
        Ok(exit_codes::SUCCESS)
    }
}

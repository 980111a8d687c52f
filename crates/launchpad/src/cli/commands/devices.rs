//! Devices command - List simulators

use clap::Args;
use console::style;
use serde::Serialize;

use launchpad_simulators::{DeviceState, Simulator};

use crate::cli::{output, Cli, OutputFormat, Session};
use crate::exit_codes;

/// List simulators
#[derive(Debug, Args)]
pub struct DevicesCommand {
    /// Only show simulators whose name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Only show booted simulators
    #[arg(long)]
    pub booted: bool,
}

#[derive(Debug, Serialize)]
struct DeviceRow {
    name: String,
    udid: String,
    state: DeviceState,
    platform: String,
    os_version: String,
    runtime: String,
}

impl From<&Simulator> for DeviceRow {
    fn from(sim: &Simulator) -> Self {
        Self {
            name: sim.name().to_string(),
            udid: sim.udid().to_string(),
            state: sim.device().state,
            platform: sim.runtime().platform().to_string(),
            os_version: sim.os_version().to_string(),
            runtime: sim.runtime().identifier.clone(),
        }
    }
}

impl DevicesCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let session = Session::host_only();
        let rows: Vec<DeviceRow> = session
            .host
            .registry
            .list_devices()
            .await?
            .iter()
            .filter(|s| self.name.as_deref().map_or(true, |n| s.name().contains(n)))
            .filter(|s| !self.booted || s.device().state == DeviceState::Booted)
            .map(DeviceRow::from)
            .collect();

        if cli.format == OutputFormat::Json {
            output::json(&rows)?;
            return Ok(exit_codes::SUCCESS);
        }

        if !cli.quiet {
            println!("{}", output::header("Simulators"));
            for row in &rows {
                let state = match row.state {
                    DeviceState::Booted => style(row.state.to_string()).green(),
                    _ => style(row.state.to_string()).dim(),
                };
                println!(
                    "  {} ({} {}) {} {}",
                    style(&row.name).bold(),
                    row.platform,
                    row.os_version,
                    style(&row.udid).dim(),
                    state
                );
            }
            if rows.is_empty() {
                output::warning("No matching simulators");
            }
        }
        Ok(exit_codes::SUCCESS)
    }
}

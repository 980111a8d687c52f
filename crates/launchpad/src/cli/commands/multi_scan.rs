//! Multi-scan command - Split the suite across simulator clones

use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use console::style;

use launchpad_xcode::{MultiScan, RunSummary, XctestrunDiscovery};

use crate::cli::output::{self, ScanSummary};
use crate::cli::{Cli, OutputFormat, Session};
use crate::exit_codes;

/// Build once and split the suite across simulator clones
#[derive(Debug, Args)]
pub struct MultiScanCommand {
    /// Number of clones to run tests on
    #[arg(long)]
    pub clones: Option<usize>,

    /// Reference simulator name
    #[arg(long)]
    pub device: Option<String>,

    /// Reference simulator OS version
    #[arg(long)]
    pub os: Option<String>,

    /// Test timeout in seconds, per clone
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Reuse existing build products instead of building
    #[arg(long)]
    pub skip_build: bool,

    /// Do not boot clones before running tests
    #[arg(long)]
    pub no_preboot: bool,

    /// Share one derived data directory between clones
    #[arg(long)]
    pub shared_derived_data: bool,
}

impl MultiScanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let started_at = Utc::now();
        let session = Session::load(cli, |config| {
            if let Some(clones) = self.clones {
                config.fleet.size = clones;
            }
            if let Some(ref device) = self.device {
                config.device.name = device.clone();
            }
            if self.os.is_some() {
                config.device.os_version = self.os.clone();
            }
            if let Some(timeout) = self.timeout {
                config.test.timeout_secs = timeout;
            }
            if self.skip_build {
                config.test.skip_build = true;
            }
            if self.no_preboot {
                config.fleet.preboot = false;
            }
            if self.shared_derived_data {
                config.fleet.isolate_derived_data = false;
            }
        })?;
        session.watch_interrupts();

        let reference = session.reference().await?;
        if cli.shows_progress() {
            println!();
            println!("{}", style("Multi-scanning...").bold());
            println!("{}", output::key_value("Scheme", &session.config.scheme));
            println!("{}", output::key_value("Reference", &reference.to_string()));
            println!("{}", output::key_value("Clones", &session.config.fleet.size.to_string()));
            println!();
        }

        // Clones always run prebuilt: the build happens once, up front
        let engine = session.engine(true, session.config.fleet.isolate_derived_data);
        let multi_scan = MultiScan::new(
            session.builder(),
            Arc::new(XctestrunDiscovery::new(session.runner.clone())),
            Arc::new(engine),
            session.host.fleet.clone(),
            session.host.control.clone(),
            session.runner.clone(),
            session.output(),
        )
        .with_clone_options(session.clone_options())
        .with_preparation(session.preparation())
        .with_reporter(session.reporter(cli))
        .skip_build(session.config.test.skip_build);

        let report = multi_scan.run(&reference).await.map_err(|e| session.tag_interrupt(e))?;

        let worst = report.worst();
        let exit_code = if session.interrupted() {
            exit_codes::CANCELLED
        } else {
            exit_codes::for_outcome(worst)
        };
        let runs: Vec<RunSummary> = report.results.iter().map(RunSummary::from).collect();

        if cli.format == OutputFormat::Json {
            output::json(&ScanSummary {
                started_at,
                finished_at: Utc::now(),
                exit_code,
                worst,
                runs,
                junit: report.merged_junit,
                xcresult: report.merged_xcresult,
            })?;
        } else if !cli.quiet {
            output::print_runs(
                &runs,
                report.merged_junit.as_deref(),
                report.merged_xcresult.as_deref(),
            );
        }

        Ok(exit_code)
    }
}

//! Scan command - Run the whole suite on the reference simulator

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use console::style;

use launchpad_xcode::{RunSummary, Scan};

use crate::cli::output::{self, ScanSummary};
use crate::cli::{Cli, OutputFormat, Session};
use crate::exit_codes;

/// Run the whole suite on the reference simulator
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Reference simulator name
    #[arg(long)]
    pub device: Option<String>,

    /// Reference simulator OS version
    #[arg(long)]
    pub os: Option<String>,

    /// Test timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory for reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Run against existing build products
    #[arg(long)]
    pub skip_build: bool,

    /// Do not collect code coverage
    #[arg(long)]
    pub no_coverage: bool,
}

impl ScanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let started_at = Utc::now();
        let session = Session::load(cli, |config| {
            if let Some(ref device) = self.device {
                config.device.name = device.clone();
            }
            if self.os.is_some() {
                config.device.os_version = self.os.clone();
            }
            if let Some(timeout) = self.timeout {
                config.test.timeout_secs = timeout;
            }
            if let Some(ref dir) = self.output_dir {
                config.output_dir = dir.clone();
            }
            if self.skip_build {
                config.test.skip_build = true;
            }
            if self.no_coverage {
                config.test.coverage = false;
            }
        })?;
        session.watch_interrupts();

        let reference = session.reference().await?;
        if cli.shows_progress() {
            println!();
            println!("{}", style("Scanning...").bold());
            println!("{}", output::key_value("Scheme", &session.config.scheme));
            println!("{}", output::key_value("Simulator", &reference.to_string()));
            println!();
        }

        let engine = session.engine(session.config.test.skip_build, false);
        let scan = Scan::new(
            Arc::new(engine),
            session.host.control.clone(),
            session.output(),
            session.reporter(cli),
        )
        .with_preparation(session.preparation());

        let report = scan.run(&reference).await.map_err(|e| session.tag_interrupt(e))?;

        let worst = report.result.outcome.reason();
        let exit_code = if session.interrupted() {
            exit_codes::CANCELLED
        } else {
            exit_codes::for_outcome(worst)
        };
        let runs = vec![RunSummary::from(&report.result)];

        if cli.format == OutputFormat::Json {
            output::json(&ScanSummary {
                started_at,
                finished_at: Utc::now(),
                exit_code,
                worst,
                runs,
                junit: report.junit,
                xcresult: Some(report.xcresult),
            })?;
        } else if !cli.quiet {
            output::print_runs(&runs, report.junit.as_deref(), Some(report.xcresult.as_path()));
            if let Some(ref log) = report.system_log {
                println!("{}", output::key_value("System log", &log.display().to_string()));
            }
        }

        Ok(exit_code)
    }
}

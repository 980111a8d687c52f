//! Output formatting utilities

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};
use launchpad_xcode::reporter::{ScanEvent, ScanReporter};
use launchpad_xcode::{FailureReason, Outcome, RunSummary};
use serde::Serialize;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Print a value as pretty JSON
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Machine-readable result of a scan or multi-scan
#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
    pub worst: Option<FailureReason>,
    pub runs: Vec<RunSummary>,
    pub junit: Option<PathBuf>,
    pub xcresult: Option<PathBuf>,
}

/// Print per-simulator results and the merged artifact locations
pub fn print_runs(runs: &[RunSummary], junit: Option<&Path>, xcresult: Option<&Path>) {
    println!();
    println!("{}", header("Results"));
    for run in runs {
        let icon = if run.outcome.is_success() {
            style("✓").green().bold()
        } else {
            style("✗").red().bold()
        };
        let tests = if run.tests_requested == 0 {
            "all tests".to_string()
        } else {
            format!("{} tests", run.tests_requested)
        };
        println!(
            "  {} {} {} ({}, {:.1}s)",
            icon,
            style(&run.name).bold(),
            style(&run.udid).dim(),
            tests,
            Duration::from_millis(run.duration_ms).as_secs_f64()
        );
        if let Outcome::Failure { message, .. } = &run.outcome {
            println!("      {}", style(message).red());
            println!("      {}", key_value("log", &run.stdout_log.display().to_string()));
        }
    }

    println!();
    if let Some(path) = junit {
        println!("{}", key_value("JUnit", &path_style().apply_to(path.display()).to_string()));
    }
    if let Some(path) = xcresult {
        println!("{}", key_value("Result bundle", &path_style().apply_to(path.display()).to_string()));
    }
}

/// Progress printed to the terminal as a scan runs
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_spinner(&self, message: String) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(spinner);
        }
    }

    fn stop_spinner(&self) {
        if let Some(spinner) = self.spinner.lock().ok().and_then(|mut slot| slot.take()) {
            spinner.finish_and_clear();
        }
    }
}

impl ScanReporter for ConsoleReporter {
    fn report(&self, event: &ScanEvent) {
        match event {
            ScanEvent::BuildStarted { scheme } => {
                self.start_spinner(format!("Building {} for testing", scheme));
            }
            ScanEvent::BuildFinished { duration } => {
                self.stop_spinner();
                success(&format!("Built in {:.1}s", duration.as_secs_f64()));
            }
            ScanEvent::TestsDiscovered { count } => {
                info(&format!("Discovered {} tests", count));
            }
            ScanEvent::FleetReady { count } => {
                info(&format!("{} simulators ready", count));
            }
            ScanEvent::RunStarted { index, name, tests, .. } => {
                let tests = if *tests == 0 {
                    "all tests".to_string()
                } else {
                    format!("{} tests", tests)
                };
                info(&format!("[{}] {}: running {}", index, style(name).bold(), tests));
            }
            ScanEvent::RunFinished {
                index,
                name,
                outcome,
                duration,
            } => {
                let message = format!("[{}] {} {} in {:.1}s", index, name, outcome, duration.as_secs_f64());
                if outcome.is_success() {
                    success(&message);
                } else {
                    error(&message);
                }
            }
            ScanEvent::ArtifactsMerged { junit, xcresult } => {
                if junit.is_none() && xcresult.is_none() {
                    warning("No reports were produced");
                }
            }
        }
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}

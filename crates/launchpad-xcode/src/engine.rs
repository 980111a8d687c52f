//! Test execution against a single simulator

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use launchpad_core::process::shell_quote;
use launchpad_core::{CancelToken, CommandSpec, ProcessRunner};
use launchpad_simulators::Simulator;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::{first_with_extension, remove_path, OutputPaths, REPORT_JUNIT, XCRESULT_EXTENSION};
use crate::destination::Destination;
use crate::error::Result;
use crate::outcome::{classify, FailureReason, Outcome};
use crate::project::{xcodebuild_pipeline, XcodeTarget};

/// Everything one test run produced
#[derive(Debug, Clone)]
pub struct TestRunResult {
    pub simulator: Simulator,
    /// Requested identifiers; empty means the whole suite
    pub tests: Vec<String>,
    pub xcresult_path: Option<PathBuf>,
    pub junit_path: Option<PathBuf>,
    pub outcome: Outcome,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
    pub duration: Duration,
}

impl TestRunResult {
    /// A run that failed before producing anything
    pub fn failed(
        simulator: Simulator,
        tests: Vec<String>,
        run_dir: &Path,
        reason: FailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            simulator,
            tests,
            xcresult_path: None,
            junit_path: None,
            outcome: Outcome::failure(reason, message),
            stdout_log: run_dir.join(STDOUT_LOG),
            stderr_log: run_dir.join(STDERR_LOG),
            duration: Duration::ZERO,
        }
    }
}

/// Machine-readable summary of a [`TestRunResult`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub udid: String,
    pub os_version: String,
    pub tests_requested: usize,
    pub outcome: Outcome,
    pub xcresult_path: Option<PathBuf>,
    pub junit_path: Option<PathBuf>,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
    pub duration_ms: u64,
}

impl From<&TestRunResult> for RunSummary {
    fn from(result: &TestRunResult) -> Self {
        Self {
            name: result.simulator.name().to_string(),
            udid: result.simulator.udid().to_string(),
            os_version: result.simulator.os_version().to_string(),
            tests_requested: result.tests.len(),
            outcome: result.outcome.clone(),
            xcresult_path: result.xcresult_path.clone(),
            junit_path: result.junit_path.clone(),
            stdout_log: result.stdout_log.clone(),
            stderr_log: result.stderr_log.clone(),
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

const STDOUT_LOG: &str = "xcodebuild.log";
const STDERR_LOG: &str = "xcodebuild.stderr.log";

/// Runs tests on one simulator
#[async_trait]
pub trait TestExecutionEngine: Send + Sync {
    /// Run `tests` (all tests when empty) on `simulator`.
    ///
    /// Never fails: every problem is folded into [`TestRunResult::outcome`].
    async fn run_tests(&self, simulator: &Simulator, tests: &[String]) -> TestRunResult;
}

/// How [`XcodebuildEngine`] invokes the test action
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Use `test-without-building` against existing build products
    pub prebuilt: bool,
    /// Give each simulator its own derived data with `Build` linked to the
    /// shared products; only honored for prebuilt runs
    pub isolate_derived_data: bool,
    pub coverage: bool,
    pub timeout: Duration,
    /// Output formatter; must understand xcbeautify's `--report junit` flags
    pub formatter: Option<String>,
    pub output_dir: PathBuf,
}

/// [`TestExecutionEngine`] driving `xcodebuild test`
#[derive(Clone)]
pub struct XcodebuildEngine {
    runner: Arc<dyn ProcessRunner>,
    target: XcodeTarget,
    options: EngineOptions,
    cancel: Option<CancelToken>,
}

impl XcodebuildEngine {
    pub fn new(runner: Arc<dyn ProcessRunner>, target: XcodeTarget, options: EngineOptions) -> Self {
        Self {
            runner,
            target,
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn isolates(&self) -> bool {
        self.options.prebuilt && self.options.isolate_derived_data
    }

    /// Derived data directory used for `udid`
    pub fn derived_data_for(&self, udid: &str) -> PathBuf {
        if self.isolates() {
            isolated_derived_data(&self.target.derived_data, udid)
        } else {
            self.target.derived_data.clone()
        }
    }

    async fn prepare(&self, run_dir: &Path, derived_data: &Path) -> Result<()> {
        remove_path(run_dir)?;
        tokio::fs::create_dir_all(run_dir).await?;

        if self.isolates() {
            tokio::fs::create_dir_all(derived_data).await?;
            let link = derived_data.join("Build");
            remove_path(&link)?;
            link_dir(&self.target.derived_data.join("Build"), &link).await?;
        }
        Ok(())
    }

    fn command(&self, simulator: &Simulator, tests: &[String], run_dir: &Path, derived_data: &Path) -> CommandSpec {
        let action = if self.options.prebuilt {
            "test-without-building"
        } else {
            "test"
        };

        let mut args = self.target.base_args(derived_data);
        args.extend([
            "-destination".to_string(),
            Destination::from(simulator).to_arg(),
            "-resultBundlePath".to_string(),
            run_dir
                .join(format!("{}.{}", simulator.udid(), XCRESULT_EXTENSION))
                .to_string_lossy()
                .into_owned(),
            "-enableCodeCoverage".to_string(),
            if self.options.coverage { "YES" } else { "NO" }.to_string(),
            "-parallel-testing-enabled".to_string(),
            "NO".to_string(),
            "-disable-concurrent-destination-testing".to_string(),
        ]);
        args.extend(tests.iter().map(|t| format!("-only-testing:{}", t)));
        args.push(action.to_string());

        let formatter = self.options.formatter.as_ref().map(|f| {
            format!(
                "{} --report junit --report-path {} --junit-report-filename {}",
                f,
                shell_quote(&run_dir.to_string_lossy()),
                REPORT_JUNIT
            )
        });
        let script = xcodebuild_pipeline(&args, &run_dir.join(STDOUT_LOG), formatter.as_deref());

        let spec = CommandSpec::shell(script)
            .stderr_log(run_dir.join(STDERR_LOG))
            .timeout(self.options.timeout);
        match &self.cancel {
            Some(token) => spec.cancel_on(token.clone()),
            None => spec,
        }
    }
}

#[async_trait]
impl TestExecutionEngine for XcodebuildEngine {
    async fn run_tests(&self, simulator: &Simulator, tests: &[String]) -> TestRunResult {
        let run_dir = OutputPaths::new(&self.options.output_dir).run_dir(simulator.udid());
        let derived_data = self.derived_data_for(simulator.udid());

        if let Err(e) = self.prepare(&run_dir, &derived_data).await {
            warn!(udid = %simulator.udid(), error = %e, "failed to prepare test run");
            return TestRunResult::failed(
                simulator.clone(),
                tests.to_vec(),
                &run_dir,
                FailureReason::ToolingFailure,
                e.to_string(),
            );
        }

        info!(
            udid = %simulator.udid(),
            name = %simulator.name(),
            tests = tests.len(),
            derived_data = %derived_data.display(),
            "running tests"
        );

        let started = Instant::now();
        let spec = self.command(simulator, tests, &run_dir, &derived_data);
        let output = self.runner.run(&spec).await;
        let outcome = classify(&output);
        let duration = started.elapsed();

        let xcresult_path = first_with_extension(&run_dir, XCRESULT_EXTENSION);
        if xcresult_path.is_none() {
            debug!(udid = %simulator.udid(), "no result bundle produced");
        }
        let junit_path = Some(run_dir.join(REPORT_JUNIT)).filter(|p| p.is_file());

        info!(
            udid = %simulator.udid(),
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "test run finished"
        );

        TestRunResult {
            simulator: simulator.clone(),
            tests: tests.to_vec(),
            xcresult_path,
            junit_path,
            outcome,
            stdout_log: run_dir.join(STDOUT_LOG),
            stderr_log: run_dir.join(STDERR_LOG),
            duration,
        }
    }
}

/// Sibling of the shared derived data directory dedicated to `udid`
pub fn isolated_derived_data(shared: &Path, udid: &str) -> PathBuf {
    let name = shared
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "DerivedData".to_string());
    shared.with_file_name(format!("{}-{}", name, udid))
}

#[cfg(unix)]
async fn link_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(original, link).await
}

#[cfg(not(unix))]
async fn link_dir(_original: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "isolated derived data requires symlinks",
    ))
}

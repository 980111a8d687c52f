//! Single-simulator scan
//!
//! A scan runs the whole suite on the reference simulator and copies its
//! artifacts to the stable output paths. Every simulator on the host is shut
//! down before the run and again on every way out of it.

use std::path::PathBuf;
use std::sync::Arc;

use launchpad_simulators::{Simulator, SimulatorControl};
use tracing::{debug, info, instrument, warn};

use crate::artifacts::{copy_artifact, OutputPaths, REPORT_JUNIT};
use crate::engine::{TestExecutionEngine, TestRunResult};
use crate::error::{Result, XcodeError};
use crate::outcome::FailureReason;
use crate::reporter::{ScanEvent, ScanReporter};

/// Simulator preparation applied before every test run
#[derive(Debug, Clone, Default)]
pub struct RunPreparation {
    /// Bundle identifier to uninstall so each run starts from a clean install
    pub app_identifier: Option<String>,
    pub disable_input_assist: bool,
}

impl RunPreparation {
    /// Best-effort; failures are logged and the run goes ahead
    pub async fn apply(&self, simulator: &Simulator) {
        if let Some(bundle_id) = &self.app_identifier {
            if let Err(e) = simulator.uninstall_app(bundle_id).await {
                warn!(udid = %simulator.udid(), bundle_id = %bundle_id, error = %e, "failed to uninstall app");
            }
        }
        if self.disable_input_assist {
            if let Err(e) = simulator.disable_auto_input_assist().await {
                warn!(udid = %simulator.udid(), error = %e, "failed to disable input assist");
            }
        }
    }
}

/// Shuts down every simulator when entered and again when left.
///
/// Call [`ShutdownScope::exit`] on normal paths. If the scope is dropped
/// without it, for instance because the owning future was cancelled, the
/// shutdown is spawned onto the current runtime instead.
pub struct ShutdownScope {
    control: Arc<dyn SimulatorControl>,
    exited: bool,
}

impl ShutdownScope {
    pub async fn enter(control: Arc<dyn SimulatorControl>) -> Self {
        shutdown_all(control.as_ref()).await;
        Self {
            control,
            exited: false,
        }
    }

    pub async fn exit(mut self) {
        self.exited = true;
        shutdown_all(self.control.as_ref()).await;
    }
}

impl Drop for ShutdownScope {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let control = self.control.clone();
                handle.spawn(async move { shutdown_all(control.as_ref()).await });
            }
            Err(_) => warn!("shutdown scope dropped outside a runtime; simulators left running"),
        }
    }
}

/// Global shutdown, logging instead of failing
pub async fn shutdown_all(control: &dyn SimulatorControl) {
    if let Err(e) = Simulator::shutdown_all(control).await {
        warn!(error = %e, "failed to shut down simulators");
    }
}

/// What a scan left behind
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub result: TestRunResult,
    /// Stable copy of the result bundle
    pub xcresult: PathBuf,
    /// Stable copy of the JUnit report, when one was produced
    pub junit: Option<PathBuf>,
    /// Copied system log, when collection succeeded
    pub system_log: Option<PathBuf>,
}

/// Single-simulator strategy
pub struct Scan {
    engine: Arc<dyn TestExecutionEngine>,
    control: Arc<dyn SimulatorControl>,
    output: OutputPaths,
    preparation: RunPreparation,
    reporter: Arc<dyn ScanReporter>,
}

impl Scan {
    pub fn new(
        engine: Arc<dyn TestExecutionEngine>,
        control: Arc<dyn SimulatorControl>,
        output: OutputPaths,
        reporter: Arc<dyn ScanReporter>,
    ) -> Self {
        Self {
            engine,
            control,
            output,
            preparation: RunPreparation::default(),
            reporter,
        }
    }

    pub fn with_preparation(mut self, preparation: RunPreparation) -> Self {
        self.preparation = preparation;
        self
    }

    /// Run every test on `reference`.
    ///
    /// Test failures are reported through the returned outcome. Errors mean
    /// the run left no usable artifacts.
    #[instrument(skip(self), fields(udid = %reference.udid(), name = %reference.name()))]
    pub async fn run(&self, reference: &Simulator) -> Result<ScanReport> {
        let scope = ShutdownScope::enter(self.control.clone()).await;
        let report = self.run_scoped(reference).await;
        scope.exit().await;
        report
    }

    async fn run_scoped(&self, reference: &Simulator) -> Result<ScanReport> {
        self.output.clear_reports()?;
        self.preparation.apply(reference).await;

        self.reporter.report(&ScanEvent::RunStarted {
            index: 0,
            name: reference.name().to_string(),
            udid: reference.udid().to_string(),
            tests: 0,
        });
        let result = self.engine.run_tests(reference, &[]).await;
        self.reporter.report(&ScanEvent::RunFinished {
            index: 0,
            name: reference.name().to_string(),
            outcome: result.outcome.clone(),
            duration: result.duration,
        });

        let (xcresult, junit) = self.copy_results(&result)?;
        let system_log = self.collect_diagnostics(reference);

        self.reporter.report(&ScanEvent::ArtifactsMerged {
            junit: junit.clone(),
            xcresult: Some(xcresult.clone()),
        });
        info!(outcome = %result.outcome, "scan finished");

        Ok(ScanReport {
            result,
            xcresult,
            junit,
            system_log,
        })
    }

    fn copy_results(&self, result: &TestRunResult) -> Result<(PathBuf, Option<PathBuf>)> {
        let Some(bundle) = &result.xcresult_path else {
            return Err(XcodeError::MissingResultBundle {
                searched: self.output.run_dir(result.simulator.udid()),
            });
        };
        let xcresult = self.output.xcresult();
        copy_artifact(bundle, &xcresult)?;

        let junit = match &result.junit_path {
            Some(report) => {
                let dest = self.output.junit();
                copy_artifact(report, &dest)?;
                Some(dest)
            }
            None if result.outcome.reason() == Some(FailureReason::TestsFailed) => {
                return Err(XcodeError::MissingJunitReport {
                    expected: self.output.run_dir(result.simulator.udid()).join(REPORT_JUNIT),
                });
            }
            None => {
                warn!(outcome = %result.outcome, "no JUnit report produced");
                None
            }
        };

        Ok((xcresult, junit))
    }

    fn collect_diagnostics(&self, simulator: &Simulator) -> Option<PathBuf> {
        let Some(source) = simulator.device().system_log_path() else {
            debug!(udid = %simulator.udid(), "no log path reported for simulator");
            return None;
        };
        let dest = self.output.system_log(simulator.name());
        match copy_artifact(&source, &dest) {
            Ok(()) => Some(dest),
            Err(e) => {
                warn!(udid = %simulator.udid(), source = %source.display(), error = %e, "failed to collect system log");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::reporter::CollectingReporter;
    use async_trait::async_trait;
    use launchpad_simulators::fake::{HostCall, InMemoryHost};
    use std::path::Path;
    use std::time::Duration;

    const JUNIT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="App" tests="1" failures="0">
  <testsuite name="AppTests.LoginTests" tests="1" failures="0">
    <testcase classname="AppTests.LoginTests" name="testLogin" time="0.1"/>
  </testsuite>
</testsuites>
"#;

    /// Engine writing fixed artifacts into the run directory
    struct StubEngine {
        root: PathBuf,
        outcome: Outcome,
        bundle: bool,
        junit: bool,
    }

    #[async_trait]
    impl TestExecutionEngine for StubEngine {
        async fn run_tests(&self, simulator: &Simulator, tests: &[String]) -> TestRunResult {
            let run_dir = OutputPaths::new(&self.root).run_dir(simulator.udid());
            std::fs::create_dir_all(&run_dir).unwrap();

            let xcresult_path = self.bundle.then(|| {
                let path = run_dir.join(format!("{}.xcresult", simulator.udid()));
                std::fs::create_dir_all(path.join("Data")).unwrap();
                std::fs::write(path.join("Info.plist"), "bundle").unwrap();
                path
            });
            let junit_path = self.junit.then(|| {
                let path = run_dir.join(REPORT_JUNIT);
                std::fs::write(&path, JUNIT).unwrap();
                path
            });

            TestRunResult {
                simulator: simulator.clone(),
                tests: tests.to_vec(),
                xcresult_path,
                junit_path,
                outcome: self.outcome.clone(),
                stdout_log: run_dir.join("xcodebuild.log"),
                stderr_log: run_dir.join("xcodebuild.stderr.log"),
                duration: Duration::from_millis(5),
            }
        }
    }

    fn reference(host: &InMemoryHost, log_dir: Option<&Path>) -> Simulator {
        let rt = host.add_runtime("iOS", "17.2");
        let udid = host.add_device("iPhone 15", &rt);
        let sim = host.simulator(&udid).unwrap();
        let mut device = sim.device().clone();
        device.log_path = log_dir.map(Path::to_path_buf);
        Simulator::new(device, sim.runtime().clone(), Arc::new(host.clone()))
    }

    fn scan(host: &InMemoryHost, root: &Path, engine: StubEngine) -> (Scan, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let scan = Scan::new(
            Arc::new(engine),
            Arc::new(host.clone()),
            OutputPaths::new(root),
            reporter.clone(),
        );
        (scan, reporter)
    }

    fn engine(root: &Path, outcome: Outcome, bundle: bool, junit: bool) -> StubEngine {
        StubEngine {
            root: root.to_path_buf(),
            outcome,
            bundle,
            junit,
        }
    }

    fn shutdown_all_count(host: &InMemoryHost) -> usize {
        host.calls().iter().filter(|c| **c == HostCall::ShutdownAll).count()
    }

    #[tokio::test]
    async fn test_scan_copies_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("device-logs");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("system.log"), "booted").unwrap();

        let host = InMemoryHost::new();
        let sim = reference(&host, Some(&logs));
        let (scan, reporter) = scan(&host, tmp.path(), engine(tmp.path(), Outcome::Success, true, true));

        let report = scan.run(&sim).await.unwrap();

        assert!(report.result.outcome.is_success());
        assert!(report.xcresult.join("Info.plist").is_file());
        assert_eq!(std::fs::read_to_string(report.junit.unwrap()).unwrap(), JUNIT);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("system_logs/iPhone 15.log")).unwrap(),
            "booted"
        );
        assert_eq!(host.calls().first(), Some(&HostCall::ShutdownAll));
        assert_eq!(host.calls().last(), Some(&HostCall::ShutdownAll));
        assert_eq!(reporter.events().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_bundle_fails_and_still_shuts_down() {
        let tmp = tempfile::tempdir().unwrap();
        let host = InMemoryHost::new();
        let sim = reference(&host, None);
        let (scan, _) = scan(&host, tmp.path(), engine(tmp.path(), Outcome::Success, false, true));

        let err = scan.run(&sim).await.unwrap_err();

        assert!(matches!(err, XcodeError::MissingResultBundle { .. }));
        assert_eq!(shutdown_all_count(&host), 2);
        assert_eq!(host.calls().last(), Some(&HostCall::ShutdownAll));
    }

    #[tokio::test]
    async fn test_missing_junit_only_fatal_for_test_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let host = InMemoryHost::new();
        let sim = reference(&host, None);

        let failed = Outcome::failure(FailureReason::TestsFailed, "1 test failed");
        let (s, _) = scan(&host, tmp.path(), engine(tmp.path(), failed, true, false));
        let err = s.run(&sim).await.unwrap_err();
        assert!(matches!(err, XcodeError::MissingJunitReport { .. }));

        let tooling = Outcome::failure(FailureReason::ToolingFailure, "xcodebuild crashed");
        let (s, _) = scan(&host, tmp.path(), engine(tmp.path(), tooling, true, false));
        let report = s.run(&sim).await.unwrap();
        assert_eq!(report.result.outcome.reason(), Some(FailureReason::ToolingFailure));
        assert!(report.junit.is_none());

        assert_eq!(shutdown_all_count(&host), 4);
    }

    #[tokio::test]
    async fn test_rerun_without_junit_clears_previous_report() {
        let tmp = tempfile::tempdir().unwrap();
        let host = InMemoryHost::new();
        let sim = reference(&host, None);

        let (s, _) = scan(&host, tmp.path(), engine(tmp.path(), Outcome::Success, true, true));
        s.run(&sim).await.unwrap();
        assert!(tmp.path().join("report.junit").is_file());

        let tooling = Outcome::failure(FailureReason::ToolingFailure, "xcodebuild crashed");
        let (s, _) = scan(&host, tmp.path(), engine(tmp.path(), tooling, false, false));
        assert!(s.run(&sim).await.is_err());

        assert!(!tmp.path().join("report.junit").exists());
        assert!(!tmp.path().join("report.xcresult").exists());
    }

    #[tokio::test]
    async fn test_diagnostics_failure_is_swallowed() {
        let tmp = tempfile::tempdir().unwrap();
        let host = InMemoryHost::new();
        let sim = reference(&host, Some(&tmp.path().join("missing")));
        let (scan, _) = scan(&host, tmp.path(), engine(tmp.path(), Outcome::Success, true, true));

        let report = scan.run(&sim).await.unwrap();
        assert!(report.system_log.is_none());
    }

    #[tokio::test]
    async fn test_preparation_runs_before_tests() {
        let tmp = tempfile::tempdir().unwrap();
        let host = InMemoryHost::new();
        let sim = reference(&host, None);
        host.fail_next("uninstall");

        let (scan, _) = scan(&host, tmp.path(), engine(tmp.path(), Outcome::Success, true, true));
        let scan = scan.with_preparation(RunPreparation {
            app_identifier: Some("com.example.app".to_string()),
            disable_input_assist: true,
        });

        scan.run(&sim).await.unwrap();

        assert!(host.calls().contains(&HostCall::Uninstall {
            udid: sim.udid().to_string(),
            bundle_id: "com.example.app".to_string(),
        }));
        assert!(!host.defaults_written().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_scope_shuts_down() {
        let host = InMemoryHost::new();
        let scope = ShutdownScope::enter(Arc::new(host.clone())).await;
        drop(scope);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(shutdown_all_count(&host), 2);
    }
}

//! Fleet scan: build once, split the suite across clones, run them in parallel

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use launchpad_core::ProcessRunner;
use launchpad_simulators::{CloneOptions, FleetProvider, Simulator, SimulatorControl};
use tracing::{info, instrument, warn};

use crate::artifacts::{merge_result_bundles, OutputPaths};
use crate::build::Builder;
use crate::destination::Destination;
use crate::discovery::TestDiscovery;
use crate::engine::{TestExecutionEngine, TestRunResult};
use crate::error::Result;
use crate::junit::JunitReport;
use crate::outcome::{worst, FailureReason};
use crate::partition::partition;
use crate::reporter::{ScanEvent, ScanReporter, TracingReporter};
use crate::scan::{shutdown_all, RunPreparation};

/// Per-clone results plus the merged artifacts on disk
#[derive(Debug, Clone)]
pub struct MultiScanReport {
    /// One result per clone, in clone index order
    pub results: Vec<TestRunResult>,
    pub discovered: usize,
    pub merged_junit: Option<PathBuf>,
    pub merged_xcresult: Option<PathBuf>,
}

impl MultiScanReport {
    /// Most severe failure across the fleet
    pub fn worst(&self) -> Option<FailureReason> {
        worst(self.results.iter().map(|r| &r.outcome))
    }
}

/// Number of clones to use for `discovered` tests.
///
/// Never more clones than tests, and at least one so an empty inventory
/// still gets a full-suite run.
pub fn fleet_size(requested: usize, discovered: usize) -> usize {
    requested.clamp(1, discovered.max(1))
}

/// Fleet strategy
pub struct MultiScan {
    builder: Builder,
    discovery: Arc<dyn TestDiscovery>,
    engine: Arc<dyn TestExecutionEngine>,
    fleet: Arc<dyn FleetProvider>,
    control: Arc<dyn SimulatorControl>,
    runner: Arc<dyn ProcessRunner>,
    output: OutputPaths,
    clone_options: CloneOptions,
    preparation: RunPreparation,
    reporter: Arc<dyn ScanReporter>,
    skip_build: bool,
}

impl MultiScan {
    pub fn new(
        builder: Builder,
        discovery: Arc<dyn TestDiscovery>,
        engine: Arc<dyn TestExecutionEngine>,
        fleet: Arc<dyn FleetProvider>,
        control: Arc<dyn SimulatorControl>,
        runner: Arc<dyn ProcessRunner>,
        output: OutputPaths,
    ) -> Self {
        Self {
            builder,
            discovery,
            engine,
            fleet,
            control,
            runner,
            output,
            clone_options: CloneOptions::default(),
            preparation: RunPreparation::default(),
            reporter: Arc::new(TracingReporter),
            skip_build: false,
        }
    }

    pub fn with_clone_options(mut self, options: CloneOptions) -> Self {
        self.clone_options = options;
        self
    }

    pub fn with_preparation(mut self, preparation: RunPreparation) -> Self {
        self.preparation = preparation;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ScanReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Reuse existing build products instead of building first
    pub fn skip_build(mut self, skip: bool) -> Self {
        self.skip_build = skip;
        self
    }

    /// Build, discover, clone, run and merge.
    ///
    /// Build, discovery and provisioning errors abort the scan before any
    /// test runs. Failures of individual clones are only reported through
    /// their results.
    #[instrument(skip(self), fields(reference = %reference.name(), clones = self.clone_options.count))]
    pub async fn run(&self, reference: &Simulator) -> Result<MultiScanReport> {
        let report = self.run_fleet(reference).await;
        shutdown_all(self.control.as_ref()).await;
        report
    }

    async fn run_fleet(&self, reference: &Simulator) -> Result<MultiScanReport> {
        self.output.clear_reports()?;

        if self.skip_build {
            info!("skipping build, using existing products");
        } else {
            self.reporter.report(&ScanEvent::BuildStarted {
                scheme: self.builder.target().scheme.clone(),
            });
            let started = Instant::now();
            self.builder.build(true, &Destination::from(reference)).await?;
            self.reporter.report(&ScanEvent::BuildFinished {
                duration: started.elapsed(),
            });
        }

        let tests = self.discovery.discover(self.builder.derived_data()).await?;
        self.reporter.report(&ScanEvent::TestsDiscovered { count: tests.len() });
        if tests.is_empty() {
            warn!("no tests discovered; running the whole suite on one clone");
        }

        let options = CloneOptions {
            count: fleet_size(self.clone_options.count, tests.len()),
            ..self.clone_options
        };
        if options.count < self.clone_options.count {
            info!(
                requested = self.clone_options.count,
                using = options.count,
                "fewer tests than clones, shrinking fleet"
            );
        }
        let clones = self.fleet.make_clones(reference, &options).await?;
        self.reporter.report(&ScanEvent::FleetReady { count: clones.len() });

        let partitions = partition(&tests, clones.len());
        let results = self.fan_out(&clones, partitions).await;

        let (merged_junit, merged_xcresult) = self.merge(&results).await;
        self.reporter.report(&ScanEvent::ArtifactsMerged {
            junit: merged_junit.clone(),
            xcresult: merged_xcresult.clone(),
        });

        Ok(MultiScanReport {
            results,
            discovered: tests.len(),
            merged_junit,
            merged_xcresult,
        })
    }

    /// One task per clone; results are collected in clone order regardless
    /// of completion order
    async fn fan_out(&self, clones: &[Simulator], partitions: Vec<Vec<String>>) -> Vec<TestRunResult> {
        let mut handles = Vec::with_capacity(clones.len());

        for (index, (clone, tests)) in clones.iter().cloned().zip(partitions.iter().cloned()).enumerate() {
            let engine = self.engine.clone();
            let preparation = self.preparation.clone();
            let reporter = self.reporter.clone();

            handles.push(tokio::spawn(async move {
                preparation.apply(&clone).await;
                reporter.report(&ScanEvent::RunStarted {
                    index,
                    name: clone.name().to_string(),
                    udid: clone.udid().to_string(),
                    tests: tests.len(),
                });

                let result = engine.run_tests(&clone, &tests).await;

                reporter.report(&ScanEvent::RunFinished {
                    index,
                    name: clone.name().to_string(),
                    outcome: result.outcome.clone(),
                    duration: result.duration,
                });
                result
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(clone = index, error = %e, "test run task failed");
                    let clone = clones[index].clone();
                    let run_dir = self.output.run_dir(clone.udid());
                    results.push(TestRunResult::failed(
                        clone,
                        partitions[index].clone(),
                        &run_dir,
                        FailureReason::ToolingFailure,
                        format!("test run task failed: {}", e),
                    ));
                }
            }
        }
        results
    }

    /// Merge whatever each clone produced; clones without artifacts are skipped
    async fn merge(&self, results: &[TestRunResult]) -> (Option<PathBuf>, Option<PathBuf>) {
        let mut reports = Vec::new();
        let mut bundles = Vec::new();

        for (index, result) in results.iter().enumerate() {
            match &result.junit_path {
                Some(path) => match JunitReport::read(path) {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(clone = index, path = %path.display(), error = %e, "skipping unreadable JUnit report"),
                },
                None => warn!(clone = index, udid = %result.simulator.udid(), "no JUnit report to merge"),
            }
            match &result.xcresult_path {
                Some(path) => bundles.push(path.clone()),
                None => warn!(clone = index, udid = %result.simulator.udid(), "no result bundle to merge"),
            }
        }

        let merged_junit = if reports.is_empty() {
            None
        } else {
            let merged = JunitReport::merge(&reports);
            let path = self.output.junit();
            match merged.write(&path) {
                Ok(()) => {
                    info!(tests = merged.tests, failures = merged.failures, path = %path.display(), "merged JUnit reports");
                    Some(path)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to write merged JUnit report");
                    None
                }
            }
        };

        let merged_xcresult = if bundles.is_empty() {
            None
        } else {
            let path = self.output.xcresult();
            match merge_result_bundles(self.runner.as_ref(), &bundles, &path).await {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!(bundles = bundles.len(), error = %e, "failed to merge result bundles");
                    None
                }
            }
        };

        (merged_junit, merged_xcresult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XcodeError;
    use crate::junit::{JunitCase, JunitSuite};
    use crate::outcome::Outcome;
    use crate::project::{XcodeProject, XcodeTarget};
    use crate::reporter::CollectingReporter;
    use async_trait::async_trait;
    use launchpad_core::fake::{ScriptedResponse, ScriptedRunner};
    use launchpad_simulators::fake::{HostCall, InMemoryHost};
    use launchpad_simulators::SimulatorCloner;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedDiscovery(Vec<String>);

    #[async_trait]
    impl TestDiscovery for FixedDiscovery {
        async fn discover(&self, _derived_data: &Path) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    /// Writes one JUnit case per requested test; clones whose name contains
    /// `time_out` time out without artifacts
    struct FakeEngine {
        root: PathBuf,
        time_out: Option<&'static str>,
        slow: Option<&'static str>,
        /// Put a directory where the merged JUnit report goes
        occupy_junit: bool,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeEngine {
        fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                time_out: None,
                slow: None,
                occupy_junit: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl TestExecutionEngine for FakeEngine {
        async fn run_tests(&self, simulator: &Simulator, tests: &[String]) -> TestRunResult {
            self.calls
                .lock()
                .unwrap()
                .push((simulator.name().to_string(), tests.to_vec()));
            if self.slow.is_some_and(|s| simulator.name().ends_with(s)) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            let run_dir = OutputPaths::new(&self.root).run_dir(simulator.udid());
            if self.time_out.is_some_and(|s| simulator.name().ends_with(s)) {
                return TestRunResult::failed(
                    simulator.clone(),
                    tests.to_vec(),
                    &run_dir,
                    FailureReason::Timeout,
                    "timed out",
                );
            }

            if self.occupy_junit {
                std::fs::create_dir_all(OutputPaths::new(&self.root).junit().join("Data")).unwrap();
            }

            std::fs::create_dir_all(&run_dir).unwrap();
            let bundle = run_dir.join(format!("{}.xcresult", simulator.udid()));
            std::fs::create_dir_all(&bundle).unwrap();

            let junit = run_dir.join("report.junit");
            JunitReport {
                name: "App".to_string(),
                tests: tests.len(),
                failures: 0,
                suites: vec![JunitSuite {
                    name: simulator.name().to_string(),
                    tests: tests.len(),
                    failures: 0,
                    time: None,
                    cases: tests
                        .iter()
                        .map(|t| JunitCase {
                            classname: simulator.name().to_string(),
                            name: t.clone(),
                            time: None,
                            failure: None,
                            skipped: false,
                        })
                        .collect(),
                }],
            }
            .write(&junit)
            .unwrap();

            TestRunResult {
                simulator: simulator.clone(),
                tests: tests.to_vec(),
                xcresult_path: Some(bundle),
                junit_path: Some(junit),
                outcome: Outcome::Success,
                stdout_log: run_dir.join("xcodebuild.log"),
                stderr_log: run_dir.join("xcodebuild.stderr.log"),
                duration: Duration::from_millis(1),
            }
        }
    }

    struct Fixture {
        host: InMemoryHost,
        runner: ScriptedRunner,
        reference: Simulator,
        tmp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let host = InMemoryHost::new();
            let rt = host.add_runtime("iOS", "17.2");
            let udid = host.add_device("iPhone 15", &rt);
            let reference = host.simulator(&udid).unwrap();
            Self {
                host,
                runner: ScriptedRunner::new(),
                reference,
                tmp: tempfile::tempdir().unwrap(),
            }
        }

        fn multi_scan(&self, tests: &[&str], engine: Arc<FakeEngine>, clones: usize) -> MultiScan {
            let root = self.tmp.path();
            let target = XcodeTarget {
                project: XcodeProject::Project(PathBuf::from("App.xcodeproj")),
                scheme: "App".to_string(),
                configuration: "Debug".to_string(),
                derived_data: root.join("DerivedData"),
            };
            let runner: Arc<dyn ProcessRunner> = Arc::new(self.runner.clone());
            let builder = Builder::new(runner.clone(), target, root.join("logs"));
            let registry = Arc::new(self.host.clone());

            MultiScan::new(
                builder,
                Arc::new(FixedDiscovery(tests.iter().map(|t| t.to_string()).collect())),
                engine,
                Arc::new(SimulatorCloner::new(registry)),
                Arc::new(self.host.clone()),
                runner,
                OutputPaths::new(root.join("out")),
            )
            .with_clone_options(CloneOptions {
                count: clones,
                preboot: false,
                ..CloneOptions::default()
            })
        }

        fn out(&self) -> PathBuf {
            self.tmp.path().join("out")
        }
    }

    const TESTS: [&str; 5] = [
        "AppTests/A/test1",
        "AppTests/A/test2",
        "AppTests/B/test1",
        "AppTests/B/test2",
        "AppTests/C/test1",
    ];

    #[test]
    fn test_fleet_size() {
        assert_eq!(fleet_size(4, 10), 4);
        assert_eq!(fleet_size(4, 2), 2);
        assert_eq!(fleet_size(4, 0), 1);
        assert_eq!(fleet_size(0, 10), 1);
    }

    #[tokio::test]
    async fn test_tests_split_across_clones() {
        let fx = Fixture::new();
        let engine = Arc::new(FakeEngine::new(&fx.out()));

        let report = fx.multi_scan(&TESTS, engine.clone(), 2).run(&fx.reference).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.worst(), None);
        assert_eq!(report.results[0].simulator.name(), "iPhone 15 Clone 0");
        assert_eq!(report.results[0].tests.len(), 3);
        assert_eq!(report.results[1].tests.len(), 2);

        let mut ran: Vec<String> = engine.calls().into_iter().flat_map(|(_, t)| t).collect();
        ran.sort();
        assert_eq!(ran, TESTS);

        assert_eq!(fx.runner.count("build-for-testing"), 1);
        assert_eq!(fx.runner.count("xcresulttool merge"), 1);
        assert_eq!(fx.host.calls().last(), Some(&HostCall::ShutdownAll));
    }

    #[tokio::test]
    async fn test_timeout_does_not_hide_other_clones() {
        let fx = Fixture::new();
        let mut engine = FakeEngine::new(&fx.out());
        engine.time_out = Some("Clone 1");
        let engine = Arc::new(engine);

        let report = fx.multi_scan(&TESTS, engine, 3).run(&fx.reference).await.unwrap();

        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].outcome.is_success());
        assert_eq!(report.results[1].outcome.reason(), Some(FailureReason::Timeout));
        assert!(report.results[2].outcome.is_success());
        assert_eq!(report.worst(), Some(FailureReason::Timeout));

        let merged = JunitReport::read(&report.merged_junit.unwrap()).unwrap();
        assert_eq!(merged.tests, report.results[0].tests.len() + report.results[2].tests.len());
        assert_eq!(merged.suites.len(), 2);

        let merge_call = fx.runner.calls().into_iter().find(|c| c.contains("xcresulttool")).unwrap();
        assert_eq!(merge_call.matches("--path").count(), 2);
    }

    #[tokio::test]
    async fn test_failed_rerun_leaves_no_stale_reports() {
        let fx = Fixture::new();
        let first = fx
            .multi_scan(&TESTS, Arc::new(FakeEngine::new(&fx.out())), 2)
            .run(&fx.reference)
            .await
            .unwrap();
        assert!(first.merged_junit.is_some());
        assert!(fx.out().join("report.junit").exists());
        std::fs::create_dir_all(fx.out().join("report.xcresult")).unwrap();

        let mut engine = FakeEngine::new(&fx.out());
        engine.time_out = Some("Clone 0");
        let second = fx.multi_scan(&TESTS, Arc::new(engine), 1).run(&fx.reference).await.unwrap();

        assert_eq!(second.worst(), Some(FailureReason::Timeout));
        assert_eq!(second.merged_junit, None);
        assert_eq!(second.merged_xcresult, None);
        assert!(!fx.out().join("report.junit").exists());
        assert!(!fx.out().join("report.xcresult").exists());
    }

    #[tokio::test]
    async fn test_junit_write_failure_keeps_results() {
        let fx = Fixture::new();
        let mut engine = FakeEngine::new(&fx.out());
        engine.occupy_junit = true;

        let report = fx.multi_scan(&TESTS, Arc::new(engine), 2).run(&fx.reference).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.worst(), None);
        assert_eq!(report.merged_junit, None);
        assert!(report.merged_xcresult.is_some());
        assert_eq!(fx.runner.count("xcresulttool merge"), 1);
    }

    #[tokio::test]
    async fn test_merge_follows_clone_order() {
        let fx = Fixture::new();
        let mut engine = FakeEngine::new(&fx.out());
        engine.slow = Some("Clone 0");
        let engine = Arc::new(engine);

        let report = fx.multi_scan(&TESTS, engine, 3).run(&fx.reference).await.unwrap();

        let merged = JunitReport::read(&fx.out().join("report.junit")).unwrap();
        let suites: Vec<&str> = merged.suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(suites, ["iPhone 15 Clone 0", "iPhone 15 Clone 1", "iPhone 15 Clone 2"]);
        assert_eq!(merged.tests, 5);
        assert_eq!(report.discovered, 5);
    }

    #[tokio::test]
    async fn test_fleet_shrinks_to_test_count() {
        let fx = Fixture::new();
        let engine = Arc::new(FakeEngine::new(&fx.out()));

        let report = fx
            .multi_scan(&TESTS[..2], engine, 4)
            .run(&fx.reference)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.tests.len() == 1));
        assert!(fx.host.device_named("iPhone 15 Clone 2").is_none());
    }

    #[tokio::test]
    async fn test_empty_inventory_runs_everything_once() {
        let fx = Fixture::new();
        let engine = Arc::new(FakeEngine::new(&fx.out()));

        let report = fx.multi_scan(&[], engine.clone(), 3).run(&fx.reference).await.unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(engine.calls(), [("iPhone 15 Clone 0".to_string(), Vec::new())]);
    }

    #[tokio::test]
    async fn test_provisioning_failure_aborts_before_tests() {
        let fx = Fixture::new();
        fx.host.fail_next("clone");
        let engine = Arc::new(FakeEngine::new(&fx.out()));

        let err = fx.multi_scan(&TESTS, engine.clone(), 2).run(&fx.reference).await.unwrap_err();

        assert!(matches!(err, XcodeError::Simulator(_)));
        assert!(engine.calls().is_empty());
        assert_eq!(fx.host.calls().last(), Some(&HostCall::ShutdownAll));
    }

    #[tokio::test]
    async fn test_build_failure_aborts() {
        let mut fx = Fixture::new();
        fx.runner = ScriptedRunner::new().on("build-for-testing", ScriptedResponse::fail(65, "error: no such module"));
        let engine = Arc::new(FakeEngine::new(&fx.out()));

        let err = fx.multi_scan(&TESTS, engine.clone(), 2).run(&fx.reference).await.unwrap_err();

        assert!(matches!(err, XcodeError::Tool { .. }));
        assert!(engine.calls().is_empty());
        assert!(fx.host.device_named("iPhone 15 Clone 0").is_none());
    }

    #[tokio::test]
    async fn test_skip_build_and_events() {
        let fx = Fixture::new();
        let engine = Arc::new(FakeEngine::new(&fx.out()));
        let reporter = Arc::new(CollectingReporter::default());

        fx.multi_scan(&TESTS, engine, 2)
            .skip_build(true)
            .with_reporter(reporter.clone())
            .run(&fx.reference)
            .await
            .unwrap();

        assert_eq!(fx.runner.count("build-for-testing"), 0);
        let events = reporter.events();
        assert!(matches!(events[0], ScanEvent::TestsDiscovered { count: 5 }));
        assert!(matches!(events[1], ScanEvent::FleetReady { count: 2 }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ScanEvent::RunFinished { .. }))
                .count(),
            2
        );
        assert!(matches!(events.last(), Some(ScanEvent::ArtifactsMerged { .. })));
    }
}

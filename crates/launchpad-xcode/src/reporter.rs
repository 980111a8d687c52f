//! Scan progress reporting

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::outcome::Outcome;

/// Events emitted while a scan runs
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// The build-for-testing step is starting
    BuildStarted { scheme: String },
    /// The build-for-testing step finished
    BuildFinished { duration: Duration },
    /// The test inventory was enumerated
    TestsDiscovered { count: usize },
    /// Clones are provisioned and ready
    FleetReady { count: usize },
    /// A test run is starting on one simulator
    RunStarted {
        index: usize,
        name: String,
        udid: String,
        tests: usize,
    },
    /// A test run ended
    RunFinished {
        index: usize,
        name: String,
        outcome: Outcome,
        duration: Duration,
    },
    /// Reports were written to their stable locations
    ArtifactsMerged {
        junit: Option<PathBuf>,
        xcresult: Option<PathBuf>,
    },
}

/// Trait for reporting scan progress
pub trait ScanReporter: Send + Sync {
    fn report(&self, event: &ScanEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ScanReporter for TracingReporter {
    fn report(&self, event: &ScanEvent) {
        match event {
            ScanEvent::BuildStarted { scheme } => {
                tracing::info!("Building {} for testing", scheme);
            }
            ScanEvent::BuildFinished { duration } => {
                tracing::info!("Build finished in {:.1}s", duration.as_secs_f64());
            }
            ScanEvent::TestsDiscovered { count } => {
                tracing::info!("Discovered {} tests", count);
            }
            ScanEvent::FleetReady { count } => {
                tracing::info!("{} simulators ready", count);
            }
            ScanEvent::RunStarted {
                index,
                name,
                udid,
                tests,
            } => {
                tracing::info!("[{}] {} ({}): running {} tests", index, name, udid, tests);
            }
            ScanEvent::RunFinished {
                index,
                name,
                outcome,
                duration,
            } => {
                if outcome.is_success() {
                    tracing::info!("[{}] {} passed in {:.1}s", index, name, duration.as_secs_f64());
                } else {
                    tracing::error!(
                        "[{}] {} {} after {:.1}s",
                        index,
                        name,
                        outcome,
                        duration.as_secs_f64()
                    );
                }
            }
            ScanEvent::ArtifactsMerged { junit, xcresult } => {
                if let Some(path) = junit {
                    tracing::info!("JUnit report: {}", path.display());
                }
                if let Some(path) = xcresult {
                    tracing::info!("Result bundle: {}", path.display());
                }
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<ScanEvent>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ScanReporter for CollectingReporter {
    fn report(&self, event: &ScanEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
    }
}

/// Reporter forwarding to several others
#[derive(Default, Clone)]
pub struct ReporterSet {
    reporters: Vec<Arc<dyn ScanReporter>>,
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ScanReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl ScanReporter for ReporterSet {
    fn report(&self, event: &ScanEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureReason;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        reporter.report(&ScanEvent::TestsDiscovered { count: 12 });
        reporter.report(&ScanEvent::RunFinished {
            index: 1,
            name: "iPhone 15 Clone 1".to_string(),
            outcome: Outcome::failure(FailureReason::Timeout, "timed out"),
            duration: Duration::from_secs(3),
        });

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ScanEvent::TestsDiscovered { count: 12 }));
    }

    #[test]
    fn test_reporter_set_broadcasts() {
        let a = Arc::new(CollectingReporter::default());
        let b = Arc::new(CollectingReporter::default());
        let set = ReporterSet::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingReporter));

        set.report(&ScanEvent::FleetReady { count: 3 });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}

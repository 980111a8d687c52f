//! Launchpad Xcode - building, running and reporting tests on simulators
//!
//! - [`build`]: `xcodebuild` build, archive and housekeeping ([`Builder`])
//! - [`discovery`]: the compiled test inventory ([`TestDiscovery`])
//! - [`engine`]: one test run on one simulator ([`TestExecutionEngine`])
//! - [`outcome`]: classifying how a run ended
//! - [`junit`]: JUnit reading, writing and merging
//! - [`scan`] and [`multi_scan`]: the single-simulator and fleet strategies

pub mod artifacts;
pub mod build;
pub mod destination;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod junit;
pub mod multi_scan;
pub mod outcome;
pub mod partition;
pub mod project;
pub mod reporter;
pub mod scan;

pub use artifacts::OutputPaths;
pub use build::Builder;
pub use destination::Destination;
pub use discovery::{TestDiscovery, XctestrunDiscovery};
pub use engine::{EngineOptions, RunSummary, TestExecutionEngine, TestRunResult, XcodebuildEngine};
pub use error::{Result, XcodeError};
pub use junit::JunitReport;
pub use multi_scan::{MultiScan, MultiScanReport};
pub use outcome::{classify, worst, FailureReason, Outcome};
pub use partition::partition;
pub use project::{XcodeProject, XcodeTarget};
pub use reporter::{ScanEvent, ScanReporter};
pub use scan::{RunPreparation, Scan, ScanReport, ShutdownScope};

//! Test run outcomes and failure classification

use std::fmt;
use std::sync::LazyLock;

use launchpad_core::{ProcessError, ProcessOutput, Termination};
use regex::Regex;
use serde::Serialize;

/// xcodebuild's exit code when tests ran and some failed
const TESTS_FAILED_EXIT_CODE: i32 = 65;

/// Why a run did not succeed, ordered by severity.
///
/// Lower severity numbers are worse; the worst reason across a fleet decides
/// the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The run was interrupted by a signal
    Interrupted,
    /// The tool or simulator failed before tests could report
    ToolingFailure,
    /// The run hit its wall-clock limit
    Timeout,
    /// Tests ran and at least one failed
    TestsFailed,
}

impl FailureReason {
    pub fn severity(self) -> u8 {
        match self {
            Self::Interrupted => 0,
            Self::ToolingFailure => 1,
            Self::Timeout => 2,
            Self::TestsFailed => 3,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::ToolingFailure => f.write_str("tooling failure"),
            Self::Timeout => f.write_str("timed out"),
            Self::TestsFailed => f.write_str("tests failed"),
        }
    }
}

/// Result of one test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { reason: FailureReason, message: String },
}

impl Outcome {
    pub fn failure(reason: FailureReason, message: impl Into<String>) -> Self {
        Self::Failure {
            reason,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("succeeded"),
            Self::Failure { reason, message } => write!(f, "{}: {}", reason, message),
        }
    }
}

/// stderr lines that mean the test runner never got going, even when
/// xcodebuild exits with the tests-failed code
static TOOLING_FAILURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(early unexpected exit|test runner exited before starting test execution|failed to install or launch the test runner|test runner failed to initialize|lost connection to testmanagerd|unable to boot|timed out while preparing|failed to prepare device)",
    )
    .expect("Invalid regex")
});

/// Classify how a test invocation ended
pub fn classify(result: &Result<ProcessOutput, ProcessError>) -> Outcome {
    let output = match result {
        Ok(output) => output,
        Err(e) => return Outcome::failure(FailureReason::ToolingFailure, e.to_string()),
    };

    match output.termination {
        Termination::Exited(0) => Outcome::Success,
        Termination::TimedOut => Outcome::failure(
            FailureReason::Timeout,
            format!("test run timed out after {:.0}s", output.duration.as_secs_f64()),
        ),
        Termination::Cancelled => Outcome::failure(FailureReason::Interrupted, "test run cancelled"),
        Termination::Signalled => {
            Outcome::failure(FailureReason::ToolingFailure, "xcodebuild killed by signal")
        }
        Termination::Exited(TESTS_FAILED_EXIT_CODE) => {
            match TOOLING_FAILURE_REGEX.find(&output.stderr) {
                Some(m) => Outcome::failure(
                    FailureReason::ToolingFailure,
                    last_line_containing(&output.stderr, m.as_str()),
                ),
                None => Outcome::failure(FailureReason::TestsFailed, "one or more tests failed"),
            }
        }
        Termination::Exited(code) => Outcome::failure(
            FailureReason::ToolingFailure,
            format!("xcodebuild exited with code {}", code),
        ),
    }
}

fn last_line_containing(text: &str, needle: &str) -> String {
    text.lines()
        .rev()
        .find(|l| l.contains(needle))
        .unwrap_or(needle)
        .trim()
        .to_string()
}

/// The most severe failure among `outcomes`, or `None` when all succeeded
pub fn worst<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Option<FailureReason> {
    outcomes
        .into_iter()
        .filter_map(Outcome::reason)
        .min_by_key(|r| r.severity())
}

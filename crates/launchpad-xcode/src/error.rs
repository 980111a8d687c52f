//! Error types for build and test orchestration

use std::path::PathBuf;

use launchpad_core::ProcessError;
use launchpad_simulators::SimulatorError;
use thiserror::Error;

/// Result type for Xcode operations
pub type Result<T> = std::result::Result<T, XcodeError>;

/// Build, discovery, scan and merge errors
#[derive(Error, Debug)]
pub enum XcodeError {
    /// An xcodebuild invocation failed; the tool output is passed through as is
    #[error("xcodebuild {action} failed: {source}")]
    Tool {
        action: String,
        #[source]
        source: ProcessError,
    },

    /// Simulator discovery or provisioning failed
    #[error(transparent)]
    Simulator(#[from] SimulatorError),

    /// The test run produced no result bundle
    #[error("No result bundle produced by the test run in {searched}")]
    MissingResultBundle { searched: PathBuf },

    /// Tests failed but the formatter wrote no JUnit report
    #[error("No JUnit report produced at {expected}")]
    MissingJunitReport { expected: PathBuf },

    /// No `.xctestrun` file after building for testing
    #[error("No .xctestrun file found under {dir}")]
    XctestrunNotFound { dir: PathBuf },

    /// The `.xctestrun` file could not be understood
    #[error("Invalid xctestrun file {path}: {message}")]
    InvalidXctestrun { path: PathBuf, message: String },

    /// A JUnit document could not be parsed
    #[error("Invalid JUnit report: {message}")]
    InvalidJunit { message: String },

    /// Property list decoding error
    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    /// Process spawning or supervision failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XcodeError {
    pub(crate) fn tool(action: impl Into<String>, source: ProcessError) -> Self {
        Self::Tool {
            action: action.into(),
            source,
        }
    }

    pub(crate) fn junit(message: impl Into<String>) -> Self {
        Self::InvalidJunit {
            message: message.into(),
        }
    }
}

//! Exit codes for the CLI

use std::fmt;

use launchpad_core::ConfigError;
use launchpad_simulators::SimulatorError;
use launchpad_xcode::{FailureReason, XcodeError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Simulator discovery or provisioning error
pub const SIMULATOR_ERROR: i32 = 3;

/// A test run hit its wall-clock limit
pub const TIMEOUT: i32 = 9;

/// xcodebuild or another tool failed for reasons other than tests
pub const TOOLING_FAILURE: i32 = 10;

/// Tests ran and some failed
pub const TESTS_FAILED: i32 = 11;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Context attached to errors that followed a Ctrl-C
#[derive(Debug, Clone, Copy)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted")
    }
}

/// Exit code for the worst classified failure of a run
pub fn for_outcome(worst: Option<FailureReason>) -> i32 {
    match worst {
        None => SUCCESS,
        Some(FailureReason::Interrupted) => CANCELLED,
        Some(FailureReason::ToolingFailure) => TOOLING_FAILURE,
        Some(FailureReason::Timeout) => TIMEOUT,
        Some(FailureReason::TestsFailed) => TESTS_FAILED,
    }
}

/// Exit code for an error that aborted a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some() {
        return CANCELLED;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    if err.downcast_ref::<SimulatorError>().is_some() {
        return SIMULATOR_ERROR;
    }
    match err.downcast_ref::<XcodeError>() {
        Some(XcodeError::Simulator(_)) => SIMULATOR_ERROR,
        Some(XcodeError::Tool { .. }) => TOOLING_FAILURE,
        _ => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_xcode::{worst, Outcome};

    #[test]
    fn test_worst_outcome_wins() {
        let outcomes = [
            Outcome::failure(FailureReason::Timeout, "timed out"),
            Outcome::failure(FailureReason::TestsFailed, "2 failures"),
            Outcome::Success,
        ];
        assert_eq!(for_outcome(worst(&outcomes)), TIMEOUT);
        assert_eq!(for_outcome(worst(&[Outcome::Success])), SUCCESS);
    }

    #[test]
    fn test_every_failure_is_nonzero() {
        for reason in [
            FailureReason::Interrupted,
            FailureReason::ToolingFailure,
            FailureReason::Timeout,
            FailureReason::TestsFailed,
        ] {
            assert_ne!(for_outcome(Some(reason)), SUCCESS);
        }
    }

    #[test]
    fn test_error_codes() {
        let err = anyhow::Error::new(XcodeError::Simulator(SimulatorError::NoDevicesFound));
        assert_eq!(for_error(&err), SIMULATOR_ERROR);

        let err = anyhow::Error::new(SimulatorError::NoRuntimesFound);
        assert_eq!(for_error(&err), SIMULATOR_ERROR);

        let err = anyhow::Error::new(ConfigError::NotFound("/tmp".into()));
        assert_eq!(for_error(&err), CONFIG_ERROR);

        assert_eq!(for_error(&anyhow::anyhow!("boom")), ERROR);
    }

    #[test]
    fn test_interrupted_error_is_cancelled() {
        let err = anyhow::Error::new(XcodeError::MissingResultBundle {
            searched: "/tmp/runs/ABC".into(),
        })
        .context(Interrupted);
        assert_eq!(for_error(&err), CANCELLED);
        assert_eq!(format!("{:#}", err).split(':').next(), Some("interrupted"));
    }
}

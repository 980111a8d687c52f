//! Error types for simulator management

use launchpad_core::ProcessError;
use thiserror::Error;

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;

/// Simulator discovery, lifecycle and cloning errors
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The runtime query succeeded but listed nothing
    #[error("No simulator runtimes found")]
    NoRuntimesFound,

    /// No device could be matched to an installed runtime
    #[error("No simulator devices found")]
    NoDevicesFound,

    /// The discovery tool produced nothing we could parse
    #[error("Simulator discovery unavailable ({query}): {reason}")]
    DiscoveryUnavailable { query: String, reason: String },

    /// `simctl clone` printed no identifier
    #[error("Cloning '{name}' did not return a device identifier")]
    CloneDidNotReturnIdentifier { name: String },

    /// `simctl clone` printed something that is not a UDID
    #[error("Cloning '{name}' returned an invalid device identifier: {output}")]
    CloneReturnedInvalidIdentifier { name: String, output: String },

    /// The clone identifier never showed up in the device list
    #[error("Cloned simulator {udid} not found in device list")]
    ClonedEnvironmentNotFound { udid: String },

    /// No device matches the configured reference
    #[error("No simulator named '{name}'{}", version_suffix(.os_version))]
    ReferenceNotFound {
        name: String,
        os_version: Option<String>,
    },

    /// Shutdown requested for a device that is not running
    #[error("Simulator {udid} is already shut down")]
    AlreadyShutdown { udid: String },

    /// A simctl lifecycle command failed
    #[error("simctl {action} failed for {udid}: {source}")]
    Command {
        action: &'static str,
        udid: String,
        #[source]
        source: ProcessError,
    },

    /// Process spawning or supervision failed
    #[error(transparent)]
    Process(#[from] ProcessError),
}

fn version_suffix(os_version: &Option<String>) -> String {
    os_version
        .as_deref()
        .map(|v| format!(" running {}", v))
        .unwrap_or_default()
}

impl SimulatorError {
    /// Discovery failures are fatal to a scan and never retried
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            Self::NoRuntimesFound | Self::NoDevicesFound | Self::DiscoveryUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_not_found_message() {
        let err = SimulatorError::ReferenceNotFound {
            name: "iPhone 15".to_string(),
            os_version: Some("17.2".to_string()),
        };
        assert_eq!(err.to_string(), "No simulator named 'iPhone 15' running 17.2");

        let err = SimulatorError::ReferenceNotFound {
            name: "iPhone 15".to_string(),
            os_version: None,
        };
        assert_eq!(err.to_string(), "No simulator named 'iPhone 15'");
    }

    #[test]
    fn test_discovery_errors_are_distinct() {
        assert!(SimulatorError::NoRuntimesFound.is_discovery());
        assert!(SimulatorError::NoDevicesFound.is_discovery());
        assert!(!matches!(
            SimulatorError::NoRuntimesFound,
            SimulatorError::NoDevicesFound
        ));
        assert!(!SimulatorError::AlreadyShutdown {
            udid: "X".to_string()
        }
        .is_discovery());
    }
}

//! Error types for Launchpad core

use std::path::PathBuf;
use thiserror::Error;

/// Process execution errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started at all
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but did not finish successfully
    #[error("Command failed ({termination}): {command}")]
    Failed {
        command: String,
        termination: String,
        stdout: String,
        stderr: String,
    },

    /// IO error while wiring up logs or waiting on the child
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Captured stderr, if the process got far enough to produce any
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

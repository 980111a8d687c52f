//! Configuration validation

use tracing::debug;

use crate::error::ConfigError;

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    debug!("validating configuration");
    validate_project(config)?;
    validate_test(config)?;
    validate_fleet(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_project(config: &Config) -> Result<(), ConfigError> {
    match (&config.project, &config.workspace) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::invalid(
                "project",
                "specify either project or workspace, not both",
            ))
        }
        (None, None) => {
            return Err(ConfigError::invalid(
                "project",
                "one of project or workspace is required",
            ))
        }
        _ => {}
    }

    if config.scheme.trim().is_empty() {
        return Err(ConfigError::invalid("scheme", "scheme cannot be empty"));
    }

    if config.device.name.trim().is_empty() {
        return Err(ConfigError::invalid("device.name", "device name cannot be empty"));
    }

    Ok(())
}

fn validate_test(config: &Config) -> Result<(), ConfigError> {
    if config.test.timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "test.timeout_secs",
            "timeout must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_fleet(config: &Config) -> Result<(), ConfigError> {
    if config.fleet.size == 0 {
        return Err(ConfigError::invalid(
            "fleet.size",
            "fleet size must be at least 1",
        ));
    }
    Ok(())
}

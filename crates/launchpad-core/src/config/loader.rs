//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file.
///
/// Relative project, workspace and output paths are resolved against the
/// directory containing the file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path)?;

    let mut config: Config = if format == "TOML" {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    if let Some(base) = path.parent() {
        resolve_paths(&mut config, base);
    }
    config.apply_env();

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

fn resolve_paths(config: &mut Config, base: &Path) {
    let resolve = |p: &mut PathBuf| {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    };
    if let Some(p) = config.project.as_mut() {
        resolve(p);
    }
    if let Some(p) = config.workspace.as_mut() {
        resolve(p);
    }
    resolve(&mut config.derived_data_path);
    resolve(&mut config.output_dir);
}

/// Find configuration file in directory or parent directories.
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

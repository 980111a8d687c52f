//! Default configuration values

use std::time::Duration;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "launchpad.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "launchpad.yaml";

/// Alternative YAML extension
pub const ALT_CONFIG_YAML: &str = "launchpad.yml";

/// Get list of config file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML, ALT_CONFIG_YAML]
}

/// Default wall-clock limit for a single test run
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default number of clones used by multi-scan
pub const DEFAULT_FLEET_SIZE: usize = 2;

/// Default reference device
pub const DEFAULT_DEVICE_NAME: &str = "iPhone 15";

/// Default stdout formatter for xcodebuild
pub const DEFAULT_FORMATTER: &str = "xcbeautify";

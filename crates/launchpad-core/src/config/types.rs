//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_DEVICE_NAME, DEFAULT_FLEET_SIZE, DEFAULT_FORMATTER, DEFAULT_TEST_TIMEOUT,
};

/// Main configuration for Launchpad
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the `.xcodeproj` (mutually exclusive with `workspace`)
    pub project: Option<PathBuf>,

    /// Path to the `.xcworkspace` (mutually exclusive with `project`)
    pub workspace: Option<PathBuf>,

    /// Scheme to build and test
    pub scheme: String,

    /// Build configuration (Debug, Release, ...)
    pub configuration: String,

    /// Directory xcodebuild writes build products into
    pub derived_data_path: PathBuf,

    /// Directory stable result artifacts are copied to
    pub output_dir: PathBuf,

    /// Reference simulator selection
    pub device: DeviceConfig,

    /// Test execution settings
    pub test: TestConfig,

    /// Multi-scan fleet settings
    pub fleet: FleetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            workspace: None,
            scheme: String::new(),
            configuration: "Debug".to_string(),
            derived_data_path: PathBuf::from("build/DerivedData"),
            output_dir: PathBuf::from("build/test_output"),
            device: DeviceConfig::default(),
            test: TestConfig::default(),
            fleet: FleetConfig::default(),
        }
    }
}

impl Config {
    /// Apply `LAUNCHPAD_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("LAUNCHPAD_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LAUNCHPAD_DERIVED_DATA") {
            self.derived_data_path = PathBuf::from(v);
        }
        if let Some(n) = get("LAUNCHPAD_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.test.timeout_secs = n;
        }
        if let Some(n) = get("LAUNCHPAD_FLEET_SIZE").and_then(|v| v.parse().ok()) {
            self.fleet.size = n;
        }
    }
}

/// Reference simulator selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Simulator display name, e.g. "iPhone 15"
    pub name: String,

    /// Exact runtime version; newest matching runtime when absent
    pub os_version: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            os_version: None,
        }
    }
}

/// Test execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Hard wall-clock limit per test run
    pub timeout_secs: u64,

    /// Collect code coverage
    pub coverage: bool,

    /// Command stdout is piped through (must accept `--report junit`)
    pub formatter: Option<String>,

    /// App to uninstall from the simulator before a run
    pub app_identifier: Option<String>,

    /// Reuse existing build products instead of building
    pub skip_build: bool,

    /// Disable keyboard autocorrection and predictive input before runs
    pub disable_input_assist: bool,
}

impl TestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TEST_TIMEOUT.as_secs(),
            coverage: true,
            formatter: Some(DEFAULT_FORMATTER.to_string()),
            app_identifier: None,
            skip_build: false,
            disable_input_assist: true,
        }
    }
}

/// Multi-scan fleet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Number of clones to run tests on
    pub size: usize,

    /// Boot every clone before tests start
    pub preboot: bool,

    /// Erase clones that already exist before reusing them
    pub erase_existing: bool,

    /// Erase clones right after creating them
    pub erase_new: bool,

    /// Give each clone its own derived data directory
    pub isolate_derived_data: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_FLEET_SIZE,
            preboot: true,
            erase_existing: true,
            erase_new: false,
            isolate_derived_data: true,
        }
    }
}

//! Raw simulator device records

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Best-effort lifecycle state as last reported by simctl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceState {
    Booted,
    Shutdown,
    Unknown,
}

impl From<String> for DeviceState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Booted" => Self::Booted,
            "Shutdown" => Self::Shutdown,
            _ => Self::Unknown,
        }
    }
}

impl From<DeviceState> for String {
    fn from(state: DeviceState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booted => f.write_str("Booted"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// One instantiated simulator as listed by `simctl list devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub udid: String,
    pub name: String,

    #[serde(default)]
    pub data_path: Option<PathBuf>,

    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_available")]
    pub is_available: bool,

    #[serde(default = "default_state")]
    pub state: DeviceState,

    #[serde(default)]
    pub device_type_identifier: Option<String>,

    /// Identifier of the runtime this device was listed under
    #[serde(skip)]
    pub runtime_identifier: String,
}

fn default_available() -> bool {
    true
}

fn default_state() -> DeviceState {
    DeviceState::Unknown
}

impl Device {
    /// Location of the simulator's system log, if simctl reported a log path
    pub fn system_log_path(&self) -> Option<PathBuf> {
        self.log_path.as_ref().map(|p| p.join("system.log"))
    }
}

/// `simctl list devices --json` document, keyed by runtime identifier
#[derive(Debug, Deserialize)]
pub(crate) struct DeviceList {
    pub devices: BTreeMap<String, Vec<Device>>,
}

impl DeviceList {
    /// Flatten into devices tagged with their runtime identifier
    pub fn into_devices(self) -> Vec<Device> {
        self.devices
            .into_iter()
            .flat_map(|(runtime, devices)| {
                devices.into_iter().map(move |mut device| {
                    device.runtime_identifier = runtime.clone();
                    device
                })
            })
            .collect()
    }
}

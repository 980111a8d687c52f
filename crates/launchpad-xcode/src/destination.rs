//! Build and test destinations

use std::fmt;

use launchpad_simulators::Simulator;

/// Where xcodebuild should build for or run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A concrete simulator
    Simulator {
        platform: String,
        udid: String,
        os_version: String,
    },
    /// Any device of a platform; used for archives
    GenericDevice { platform: String },
}

impl Destination {
    /// Generic iOS device, the archive destination
    pub fn generic_ios() -> Self {
        Self::GenericDevice {
            platform: "iOS".to_string(),
        }
    }

    /// Value of `-destination`
    pub fn to_arg(&self) -> String {
        match self {
            Self::Simulator {
                platform,
                udid,
                os_version,
            } => format!("platform={} Simulator,id={},OS={}", platform, udid, os_version),
            Self::GenericDevice { platform } => format!("generic/platform={}", platform),
        }
    }
}

impl From<&Simulator> for Destination {
    fn from(sim: &Simulator) -> Self {
        let platform = match sim.runtime().platform() {
            "" => "iOS",
            p => p,
        };
        Self::Simulator {
            platform: platform.to_string(),
            udid: sim.udid().to_string(),
            os_version: sim.os_version().to_string(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

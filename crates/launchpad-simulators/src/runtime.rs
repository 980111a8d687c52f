//! Installed simulator runtimes

use serde::{Deserialize, Serialize};

/// An installed OS image simulators are created against.
///
/// Runtimes carry no identity across runs; they are rebuilt from
/// `simctl list runtimes` on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    /// e.g. `com.apple.CoreSimulator.SimRuntime.iOS-17-2`
    pub identifier: String,

    /// e.g. `iOS 17.2`
    pub name: String,

    /// Platform family; older Xcode versions omit it
    #[serde(default)]
    pub platform: Option<String>,

    /// e.g. `17.2`
    pub version: String,

    #[serde(rename = "buildversion", default)]
    pub build_version: String,

    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

impl Runtime {
    /// Fill in a missing platform from the first word of the name.
    ///
    /// Some simctl versions leave `platform` out entirely, but the name is
    /// always `<platform> <version>`.
    pub fn normalized(mut self) -> Self {
        let missing = self
            .platform
            .as_deref()
            .map(|p| p.trim().is_empty())
            .unwrap_or(true);
        if missing {
            self.platform = self.name.split_whitespace().next().map(String::from);
        }
        self
    }

    /// Platform family, e.g. `iOS`, `tvOS`, `watchOS`
    pub fn platform(&self) -> &str {
        self.platform.as_deref().unwrap_or_default()
    }

    /// Version as semver, padding missing components with zero
    pub fn semver(&self) -> semver::Version {
        parse_lenient_version(&self.version)
    }

    pub fn is_ios(&self) -> bool {
        self.platform().eq_ignore_ascii_case("ios")
    }
}

/// Parse `17`, `17.2` or `17.2.1` into a semver version; garbage becomes 0.0.0
pub fn parse_lenient_version(version: &str) -> semver::Version {
    let mut parts = version
        .trim()
        .split('.')
        .map(|p| p.trim().parse::<u64>().unwrap_or(0));
    semver::Version::new(
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// `simctl list runtimes --json` document
#[derive(Debug, Deserialize)]
pub(crate) struct RuntimeList {
    pub runtimes: Vec<Runtime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(name: &str, platform: Option<&str>) -> Runtime {
        Runtime {
            identifier: "com.apple.CoreSimulator.SimRuntime.iOS-17-2".to_string(),
            name: name.to_string(),
            platform: platform.map(String::from),
            version: "17.2".to_string(),
            build_version: "21C62".to_string(),
            is_available: true,
        }
    }

    #[test]
    fn test_platform_inferred_from_name() {
        assert_eq!(runtime("iOS 17.2", None).normalized().platform(), "iOS");
        assert_eq!(runtime("tvOS 17.2", Some("")).normalized().platform(), "tvOS");
        assert_eq!(runtime("iOS 17.2", Some("xrOS")).normalized().platform(), "xrOS");
    }

    #[test]
    fn test_normalize_never_fails_on_empty_name() {
        let r = runtime("", None).normalized();
        assert_eq!(r.platform(), "");
    }

    #[test]
    fn test_lenient_version() {
        assert_eq!(parse_lenient_version("17"), semver::Version::new(17, 0, 0));
        assert_eq!(parse_lenient_version("17.2"), semver::Version::new(17, 2, 0));
        assert_eq!(parse_lenient_version("16.4.1"), semver::Version::new(16, 4, 1));
        assert_eq!(parse_lenient_version("beta"), semver::Version::new(0, 0, 0));
        assert!(parse_lenient_version("17.10") > parse_lenient_version("17.2"));
    }

    #[test]
    fn test_decode_runtime_list() {
        let json = r#"{
          "runtimes": [{
            "bundlePath": "/Library/Developer/CoreSimulator/Volumes/iOS_21C62/iOS 17.2.simruntime",
            "buildversion": "21C62",
            "platform": "iOS",
            "runtimeRoot": "/",
            "identifier": "com.apple.CoreSimulator.SimRuntime.iOS-17-2",
            "version": "17.2",
            "isInternal": false,
            "isAvailable": true,
            "name": "iOS 17.2",
            "supportedDeviceTypes": []
          }]
        }"#;
        let list: RuntimeList = serde_json::from_str(json).unwrap();
        assert_eq!(list.runtimes.len(), 1);
        assert_eq!(list.runtimes[0].build_version, "21C62");
        assert!(list.runtimes[0].is_ios());
    }
}

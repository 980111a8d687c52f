//! Environment registry: instantiated simulators joined with their runtimes

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use launchpad_core::{CommandSpec, ProcessRunner};
use tracing::{debug, instrument};

use crate::catalog::RuntimeCatalog;
use crate::control::SimulatorControl;
use crate::device::{Device, DeviceList};
use crate::error::{Result, SimulatorError};
use crate::runtime::{parse_lenient_version, Runtime};
use crate::simulator::Simulator;

/// Source of simulator handles
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// List every simulator whose runtime is installed.
    ///
    /// Host state is re-queried on every call. Fails with
    /// [`SimulatorError::NoDevicesFound`] when nothing survives the join.
    async fn list_devices(&self) -> Result<Vec<Simulator>>;

    /// Look a simulator up by UDID (case-insensitive)
    async fn find_by_udid(&self, udid: &str) -> Result<Option<Simulator>> {
        Ok(self
            .list_devices()
            .await?
            .into_iter()
            .find(|s| s.udid().eq_ignore_ascii_case(udid)))
    }
}

/// [`DeviceRegistry`] backed by `xcrun simctl list devices --json`
#[derive(Clone)]
pub struct SimctlRegistry {
    runner: Arc<dyn ProcessRunner>,
    catalog: Arc<dyn RuntimeCatalog>,
    control: Arc<dyn SimulatorControl>,
}

impl SimctlRegistry {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        catalog: Arc<dyn RuntimeCatalog>,
        control: Arc<dyn SimulatorControl>,
    ) -> Self {
        Self {
            runner,
            catalog,
            control,
        }
    }

    async fn raw_devices(&self) -> Result<Vec<Device>> {
        let spec = CommandSpec::xcrun(["simctl", "list", "devices", "--json"]);
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            return Err(SimulatorError::DiscoveryUnavailable {
                query: "devices".to_string(),
                reason: format!("{}: {}", output.termination, output.stderr.trim()),
            });
        }
        parse_devices(&output.stdout)
    }
}

#[async_trait]
impl DeviceRegistry for SimctlRegistry {
    #[instrument(skip(self))]
    async fn list_devices(&self) -> Result<Vec<Simulator>> {
        let runtimes = self.catalog.list_runtimes().await?;
        let devices = self.raw_devices().await?;
        join_devices(devices, runtimes, &self.control)
    }
}

/// Decode a device listing
pub fn parse_devices(json: &str) -> Result<Vec<Device>> {
    if json.trim().is_empty() {
        return Err(SimulatorError::DiscoveryUnavailable {
            query: "devices".to_string(),
            reason: "empty output".to_string(),
        });
    }
    let list: DeviceList =
        serde_json::from_str(json).map_err(|e| SimulatorError::DiscoveryUnavailable {
            query: "devices".to_string(),
            reason: e.to_string(),
        })?;
    Ok(list.into_devices())
}

/// Attach each device to its runtime.
///
/// Devices whose runtime is not installed are dropped silently; the runtime
/// may have been removed since the device was created.
pub fn join_devices(
    devices: Vec<Device>,
    runtimes: Vec<Runtime>,
    control: &Arc<dyn SimulatorControl>,
) -> Result<Vec<Simulator>> {
    let by_id: HashMap<String, Runtime> = runtimes
        .into_iter()
        .map(|r| (r.identifier.clone(), r))
        .collect();

    let simulators: Vec<Simulator> = devices
        .into_iter()
        .filter_map(|device| match by_id.get(&device.runtime_identifier) {
            Some(runtime) => Some(Simulator::new(device, runtime.clone(), control.clone())),
            None => {
                debug!(
                    udid = %device.udid,
                    runtime = %device.runtime_identifier,
                    "dropping device with unknown runtime"
                );
                None
            }
        })
        .collect();

    if simulators.is_empty() {
        return Err(SimulatorError::NoDevicesFound);
    }
    Ok(simulators)
}

/// Pick the reference simulator by name.
///
/// With `os_version`, the runtime version must match it; otherwise the newest
/// runtime carrying that device name wins.
pub fn select_reference(
    simulators: &[Simulator],
    name: &str,
    os_version: Option<&str>,
) -> Result<Simulator> {
    let mut candidates = simulators
        .iter()
        .filter(|s| s.name() == name && s.device().is_available);

    let selected = match os_version {
        Some(wanted) => {
            let wanted_version = parse_lenient_version(wanted);
            candidates
                .find(|s| s.runtime().version == wanted || s.runtime().semver() == wanted_version)
        }
        None => candidates.fold(None::<&Simulator>, |best, s| match best {
            Some(b) if b.runtime().semver() >= s.runtime().semver() => Some(b),
            _ => Some(s),
        }),
    };

    selected
        .cloned()
        .ok_or_else(|| SimulatorError::ReferenceNotFound {
            name: name.to_string(),
            os_version: os_version.map(String::from),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Simctl;
    use crate::runtime::Runtime;
    use launchpad_core::fake::{ScriptedResponse, ScriptedRunner};

    const RUNTIMES: &str = r#"{"runtimes":[
      {"identifier":"rt.iOS-17-2","name":"iOS 17.2","platform":"iOS","version":"17.2","buildversion":"21C62","isAvailable":true},
      {"identifier":"rt.iOS-16-4","name":"iOS 16.4","platform":"iOS","version":"16.4","buildversion":"20E247","isAvailable":true}
    ]}"#;

    const DEVICES: &str = r#"{"devices":{
      "rt.iOS-17-2":[{"udid":"AAAAAAAA-0000-0000-0000-000000000001","name":"iPhone 15","state":"Shutdown","isAvailable":true}],
      "rt.iOS-16-4":[{"udid":"AAAAAAAA-0000-0000-0000-000000000002","name":"iPhone 15","state":"Shutdown","isAvailable":true}],
      "rt.iOS-15-0":[{"udid":"AAAAAAAA-0000-0000-0000-000000000003","name":"iPhone 13","state":"Shutdown","isAvailable":true}]
    }}"#;

    fn registry(runner: ScriptedRunner) -> SimctlRegistry {
        let runner: Arc<dyn ProcessRunner> = Arc::new(runner);
        let catalog = Arc::new(crate::catalog::SimctlCatalog::new(runner.clone()));
        let control = Arc::new(Simctl::new(runner.clone()));
        SimctlRegistry::new(runner, catalog, control)
    }

    #[tokio::test]
    async fn test_join_drops_unknown_runtime() {
        let runner = ScriptedRunner::new()
            .on("list runtimes", ScriptedResponse::ok(RUNTIMES))
            .on("list devices", ScriptedResponse::ok(DEVICES));
        let devices = registry(runner).list_devices().await.unwrap();

        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.name() == "iPhone 15"));
    }

    #[tokio::test]
    async fn test_queries_catalog_every_call() {
        let runner = ScriptedRunner::new()
            .on("list runtimes", ScriptedResponse::ok(RUNTIMES))
            .on("list devices", ScriptedResponse::ok(DEVICES));
        let registry = registry(runner.clone());

        registry.list_devices().await.unwrap();
        registry.list_devices().await.unwrap();
        assert_eq!(runner.count("list runtimes"), 2);
        assert_eq!(runner.count("list devices"), 2);
    }

    #[tokio::test]
    async fn test_empty_join_is_no_devices() {
        let runner = ScriptedRunner::new()
            .on("list runtimes", ScriptedResponse::ok(RUNTIMES))
            .on(
                "list devices",
                ScriptedResponse::ok(r#"{"devices":{"rt.gone":[{"udid":"X","name":"Y"}]}}"#),
            );
        let err = registry(runner).list_devices().await.unwrap_err();
        assert!(matches!(err, SimulatorError::NoDevicesFound));
    }

    #[tokio::test]
    async fn test_empty_runtimes_propagates() {
        let runner = ScriptedRunner::new()
            .on("list runtimes", ScriptedResponse::ok(r#"{"runtimes":[]}"#))
            .on("list devices", ScriptedResponse::ok(DEVICES));
        let err = registry(runner).list_devices().await.unwrap_err();
        assert!(matches!(err, SimulatorError::NoRuntimesFound));
    }

    #[tokio::test]
    async fn test_find_by_udid_is_case_insensitive() {
        let runner = ScriptedRunner::new()
            .on("list runtimes", ScriptedResponse::ok(RUNTIMES))
            .on("list devices", ScriptedResponse::ok(DEVICES));
        let found = registry(runner)
            .find_by_udid("aaaaaaaa-0000-0000-0000-000000000002")
            .await
            .unwrap();
        assert_eq!(found.unwrap().runtime().version, "16.4");
    }

    fn simulators() -> Vec<Simulator> {
        let runtimes: Vec<Runtime> = crate::catalog::parse_runtimes(RUNTIMES).unwrap();
        let devices = parse_devices(DEVICES).unwrap();
        let control: Arc<dyn SimulatorControl> =
            Arc::new(Simctl::new(Arc::new(ScriptedRunner::new())));
        join_devices(devices, runtimes, &control).unwrap()
    }

    #[test]
    fn test_select_reference_prefers_newest_runtime() {
        let sims = simulators();
        let reference = select_reference(&sims, "iPhone 15", None).unwrap();
        assert_eq!(reference.runtime().version, "17.2");
    }

    #[test]
    fn test_select_reference_by_version() {
        let sims = simulators();
        let reference = select_reference(&sims, "iPhone 15", Some("16.4")).unwrap();
        assert_eq!(reference.udid(), "AAAAAAAA-0000-0000-0000-000000000002");
    }

    #[test]
    fn test_select_reference_missing() {
        let sims = simulators();
        let err = select_reference(&sims, "iPhone 15", Some("18.0")).unwrap_err();
        assert!(matches!(err, SimulatorError::ReferenceNotFound { .. }));
        assert!(select_reference(&sims, "iPad Pro", None).is_err());
    }
}

//! In-memory simulator host for tests
//!
//! [`InMemoryHost`] plays catalog, registry and `simctl` at once so cloning,
//! scanning and teardown logic can be exercised without Xcode. Failures are
//! injected per action with [`InMemoryHost::fail_next`] and
//! [`InMemoryHost::fail_on`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use launchpad_core::ProcessError;

use crate::catalog::RuntimeCatalog;
use crate::control::SimulatorControl;
use crate::device::{Device, DeviceState};
use crate::error::{Result, SimulatorError};
use crate::registry::{join_devices, DeviceRegistry};
use crate::runtime::Runtime;
use crate::simulator::Simulator;

/// A lifecycle command observed by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Boot(String),
    Shutdown(String),
    Erase(String),
    Delete(String),
    Clone { source: String, name: String },
    Uninstall { udid: String, bundle_id: String },
    WriteDefault { udid: String, key: String },
    ShutdownAll,
}

struct Failure {
    action: &'static str,
    udid: Option<String>,
    remaining: Option<usize>,
}

#[derive(Default)]
struct HostState {
    runtimes: Vec<Runtime>,
    devices: Vec<Device>,
    booted: HashSet<String>,
    calls: Vec<HostCall>,
    failures: Vec<Failure>,
    defaults: Vec<(String, String, String, bool)>,
    hidden: HashSet<String>,
    hide_clones: bool,
}

/// Fake host implementing [`RuntimeCatalog`], [`DeviceRegistry`] and
/// [`SimulatorControl`] over shared in-memory state
#[derive(Clone, Default)]
pub struct InMemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Install a runtime and return its identifier
    pub fn add_runtime(&self, platform: &str, version: &str) -> String {
        let identifier = format!(
            "com.apple.CoreSimulator.SimRuntime.{}-{}",
            platform,
            version.replace('.', "-")
        );
        self.state().runtimes.push(Runtime {
            identifier: identifier.clone(),
            name: format!("{} {}", platform, version),
            platform: Some(platform.to_string()),
            version: version.to_string(),
            build_version: String::new(),
            is_available: true,
        });
        identifier
    }

    /// Uninstall a runtime; its devices stay behind, orphaned
    pub fn remove_runtime(&self, identifier: &str) {
        self.state().runtimes.retain(|r| r.identifier != identifier);
    }

    /// Create a shut-down device on `runtime` and return its UDID
    pub fn add_device(&self, name: &str, runtime: &str) -> String {
        let udid = new_udid();
        self.state().devices.push(make_device(&udid, name, runtime));
        udid
    }

    /// Handle for `udid`, if the device and its runtime exist
    pub fn simulator(&self, udid: &str) -> Option<Simulator> {
        let state = self.state();
        let device = state.devices.iter().find(|d| d.udid == udid)?.clone();
        let runtime = state
            .runtimes
            .iter()
            .find(|r| r.identifier == device.runtime_identifier)?
            .clone();
        drop(state);
        Some(Simulator::new(device, runtime, Arc::new(self.clone())))
    }

    pub fn device_named(&self, name: &str) -> Option<Device> {
        self.state().devices.iter().find(|d| d.name == name).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.state().devices.clone()
    }

    pub fn is_booted(&self, udid: &str) -> bool {
        self.state().booted.contains(udid)
    }

    pub fn booted(&self) -> Vec<String> {
        let mut booted: Vec<String> = self.state().booted.iter().cloned().collect();
        booted.sort();
        booted
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    /// `(udid, domain, key, value)` for every default written
    pub fn defaults_written(&self) -> Vec<(String, String, String, bool)> {
        self.state().defaults.clone()
    }

    /// Fail the next `action` on any device
    pub fn fail_next(&self, action: &'static str) {
        self.state().failures.push(Failure {
            action,
            udid: None,
            remaining: Some(1),
        });
    }

    /// Fail every `action` on `udid`
    pub fn fail_on(&self, action: &'static str, udid: &str) {
        self.state().failures.push(Failure {
            action,
            udid: Some(udid.to_string()),
            remaining: None,
        });
    }

    /// Keep future clones out of the device listing
    pub fn hide_clones(&self) {
        self.state().hide_clones = true;
    }

    fn record(&self, action: &'static str, udid: &str, call: HostCall) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);

        let hit = state.failures.iter_mut().find(|f| {
            f.action == action
                && f.udid.as_deref().map_or(true, |u| u == udid)
                && f.remaining != Some(0)
        });
        if let Some(failure) = hit {
            if let Some(n) = failure.remaining.as_mut() {
                *n -= 1;
            }
            return Err(SimulatorError::Command {
                action,
                udid: udid.to_string(),
                source: ProcessError::Failed {
                    command: format!("xcrun simctl {} {}", action, udid),
                    termination: "exit code 1".to_string(),
                    stdout: String::new(),
                    stderr: "injected failure".to_string(),
                },
            });
        }
        Ok(())
    }

    fn require_device(&self, action: &'static str, udid: &str) -> Result<()> {
        if self.state().devices.iter().any(|d| d.udid == udid) {
            return Ok(());
        }
        Err(SimulatorError::Command {
            action,
            udid: udid.to_string(),
            source: ProcessError::Failed {
                command: format!("xcrun simctl {} {}", action, udid),
                termination: "exit code 148".to_string(),
                stdout: String::new(),
                stderr: "Invalid device".to_string(),
            },
        })
    }
}

fn new_udid() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string().to_uppercase()
}

fn make_device(udid: &str, name: &str, runtime: &str) -> Device {
    Device {
        udid: udid.to_string(),
        name: name.to_string(),
        data_path: Some(PathBuf::from(format!("/tmp/CoreSimulator/Devices/{}/data", udid))),
        log_path: None,
        is_available: true,
        state: DeviceState::Shutdown,
        device_type_identifier: None,
        runtime_identifier: runtime.to_string(),
    }
}

#[async_trait]
impl RuntimeCatalog for InMemoryHost {
    async fn list_runtimes(&self) -> Result<Vec<Runtime>> {
        let runtimes = self.state().runtimes.clone();
        if runtimes.is_empty() {
            return Err(SimulatorError::NoRuntimesFound);
        }
        Ok(runtimes)
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryHost {
    async fn list_devices(&self) -> Result<Vec<Simulator>> {
        let runtimes = self.list_runtimes().await?;
        let devices = {
            let state = self.state();
            state
                .devices
                .iter()
                .filter(|d| !state.hidden.contains(&d.udid))
                .map(|d| {
                    let mut d = d.clone();
                    d.state = if state.booted.contains(&d.udid) {
                        DeviceState::Booted
                    } else {
                        DeviceState::Shutdown
                    };
                    d
                })
                .collect()
        };
        let control: Arc<dyn SimulatorControl> = Arc::new(self.clone());
        join_devices(devices, runtimes, &control)
    }
}

#[async_trait]
impl SimulatorControl for InMemoryHost {
    async fn boot(&self, udid: &str) -> Result<()> {
        self.record("boot", udid, HostCall::Boot(udid.to_string()))?;
        self.require_device("boot", udid)?;
        self.state().booted.insert(udid.to_string());
        Ok(())
    }

    async fn shutdown(&self, udid: &str) -> Result<()> {
        self.record("shutdown", udid, HostCall::Shutdown(udid.to_string()))?;
        self.require_device("shutdown", udid)?;
        if !self.state().booted.remove(udid) {
            return Err(SimulatorError::AlreadyShutdown {
                udid: udid.to_string(),
            });
        }
        Ok(())
    }

    async fn erase(&self, udid: &str) -> Result<()> {
        self.record("erase", udid, HostCall::Erase(udid.to_string()))?;
        self.require_device("erase", udid)
    }

    async fn delete(&self, udid: &str) -> Result<()> {
        self.record("delete", udid, HostCall::Delete(udid.to_string()))?;
        self.require_device("delete", udid)?;
        let mut state = self.state();
        state.devices.retain(|d| d.udid != udid);
        state.booted.remove(udid);
        Ok(())
    }

    async fn clone_device(&self, udid: &str, name: &str) -> Result<String> {
        self.record(
            "clone",
            udid,
            HostCall::Clone {
                source: udid.to_string(),
                name: name.to_string(),
            },
        )?;
        self.require_device("clone", udid)?;

        let mut state = self.state();
        let runtime = state
            .devices
            .iter()
            .find(|d| d.udid == udid)
            .map(|d| d.runtime_identifier.clone())
            .unwrap_or_default();
        let clone_udid = new_udid();
        state.devices.push(make_device(&clone_udid, name, &runtime));
        if state.hide_clones {
            state.hidden.insert(clone_udid.clone());
        }
        Ok(format!("{}\n", clone_udid))
    }

    async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.record(
            "uninstall",
            udid,
            HostCall::Uninstall {
                udid: udid.to_string(),
                bundle_id: bundle_id.to_string(),
            },
        )
    }

    async fn write_default(&self, udid: &str, domain: &str, key: &str, value: bool) -> Result<()> {
        self.record(
            "spawn",
            udid,
            HostCall::WriteDefault {
                udid: udid.to_string(),
                key: key.to_string(),
            },
        )?;
        self.state().defaults.push((
            udid.to_string(),
            domain.to_string(),
            key.to_string(),
            value,
        ));
        Ok(())
    }

    async fn shutdown_all(&self) -> Result<()> {
        self.record("shutdown_all", "all", HostCall::ShutdownAll)?;
        self.state().booted.clear();
        Ok(())
    }
}

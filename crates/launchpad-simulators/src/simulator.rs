//! Environment handle: one instantiated simulator plus its lifecycle

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::control::SimulatorControl;
use crate::device::Device;
use crate::error::{Result, SimulatorError};
use crate::registry::DeviceRegistry;
use crate::runtime::Runtime;

/// Oldest iOS runtime whose keyboard defaults we know how to flip
const INPUT_ASSIST_MIN_VERSION: semver::Version = semver::Version::new(13, 0, 0);

const PREFERENCES_DOMAIN: &str = "com.apple.Preferences";

/// Keyboard features that interfere with UI tests typing into text fields
const INPUT_ASSIST_KEYS: &[&str] = &[
    "KeyboardAutocorrection",
    "KeyboardPrediction",
    "KeyboardAutocapitalization",
    "KeyboardCheckSpelling",
    "KeyboardShowPredictionBar",
    "DidShowContinuousPathIntroduction",
];

/// A simulator device bound to its runtime and a lifecycle backend.
///
/// Handles compare equal when they refer to the same UDID.
#[derive(Clone)]
pub struct Simulator {
    device: Device,
    runtime: Runtime,
    control: Arc<dyn SimulatorControl>,
}

impl Simulator {
    pub fn new(device: Device, runtime: Runtime, control: Arc<dyn SimulatorControl>) -> Self {
        Self {
            device,
            runtime,
            control,
        }
    }

    pub fn udid(&self) -> &str {
        &self.device.udid
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    pub fn os_version(&self) -> &str {
        &self.runtime.version
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub async fn boot(&self) -> Result<()> {
        debug!(udid = %self.udid(), name = %self.name(), "booting simulator");
        self.control.boot(self.udid()).await
    }

    /// Shut the simulator down; a device that is already down is not an error
    pub async fn shutdown(&self) -> Result<()> {
        match self.control.shutdown(self.udid()).await {
            Ok(()) => Ok(()),
            Err(SimulatorError::AlreadyShutdown { .. }) => {
                debug!(udid = %self.udid(), "simulator already shut down");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Shut down, then wipe all content and settings
    pub async fn erase(&self) -> Result<()> {
        self.shutdown().await?;
        debug!(udid = %self.udid(), "erasing simulator");
        self.control.erase(self.udid()).await
    }

    pub async fn uninstall_app(&self, bundle_id: &str) -> Result<()> {
        self.control.uninstall(self.udid(), bundle_id).await
    }

    pub async fn delete(&self) -> Result<()> {
        debug!(udid = %self.udid(), name = %self.name(), "deleting simulator");
        self.control.delete(self.udid()).await
    }

    /// Clone this simulator under `name` and look the clone up in `registry`.
    ///
    /// When `erase` is set and erasing the fresh clone fails, the clone is
    /// deleted before the error is returned.
    pub async fn clone_as(
        &self,
        name: &str,
        erase: bool,
        registry: &dyn DeviceRegistry,
    ) -> Result<Simulator> {
        let output = self.control.clone_device(self.udid(), name).await?;
        let udid = parse_clone_identifier(name, &output)?;

        let clone = registry
            .find_by_udid(&udid)
            .await?
            .ok_or_else(|| SimulatorError::ClonedEnvironmentNotFound { udid: udid.clone() })?;

        info!(source = %self.udid(), udid = %clone.udid(), name, "cloned simulator");

        if erase {
            if let Err(err) = clone.erase().await {
                if let Err(delete_err) = clone.delete().await {
                    warn!(
                        udid = %clone.udid(),
                        error = %delete_err,
                        "failed to delete clone after erase failure"
                    );
                }
                return Err(err);
            }
        }

        Ok(clone)
    }

    /// Turn off autocorrection and friends on iOS 13+; no-op elsewhere
    pub async fn disable_auto_input_assist(&self) -> Result<()> {
        if !self.runtime.is_ios() || self.runtime.semver() < INPUT_ASSIST_MIN_VERSION {
            debug!(
                udid = %self.udid(),
                platform = %self.runtime.platform(),
                version = %self.runtime.version,
                "skipping input assist defaults"
            );
            return Ok(());
        }

        for key in INPUT_ASSIST_KEYS {
            self.control
                .write_default(self.udid(), PREFERENCES_DOMAIN, key, false)
                .await?;
        }
        Ok(())
    }

    /// Shut down every simulator on the host
    pub async fn shutdown_all(control: &dyn SimulatorControl) -> Result<()> {
        debug!("shutting down all simulators");
        control.shutdown_all().await
    }
}

/// Validate the identifier printed by a clone command
fn parse_clone_identifier(name: &str, output: &str) -> Result<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(SimulatorError::CloneDidNotReturnIdentifier {
            name: name.to_string(),
        });
    }

    uuid::Uuid::parse_str(trimmed)
        .map(|u| u.hyphenated().to_string().to_uppercase())
        .map_err(|_| SimulatorError::CloneReturnedInvalidIdentifier {
            name: name.to_string(),
            output: trimmed.to_string(),
        })
}

impl PartialEq for Simulator {
    fn eq(&self, other: &Self) -> bool {
        self.device.udid == other.device.udid
    }
}

impl Eq for Simulator {}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("udid", &self.device.udid)
            .field("name", &self.device.name)
            .field("runtime", &self.runtime.identifier)
            .finish()
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}) [{}]",
            self.device.name,
            self.runtime.platform(),
            self.runtime.version,
            self.device.udid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{HostCall, InMemoryHost};

    fn host() -> (InMemoryHost, Simulator) {
        let host = InMemoryHost::new();
        let ios17 = host.add_runtime("iOS", "17.2");
        let reference = host.add_device("iPhone 15", &ios17);
        let sim = host.simulator(&reference).unwrap();
        (host, sim)
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (host, sim) = host();
        sim.shutdown().await.unwrap();
        sim.shutdown().await.unwrap();
        assert!(!host.is_booted(sim.udid()));
    }

    #[tokio::test]
    async fn test_erase_shuts_down_first() {
        let (host, sim) = host();
        sim.boot().await.unwrap();
        sim.erase().await.unwrap();

        let calls = host.calls();
        let shutdown = calls
            .iter()
            .position(|c| matches!(c, HostCall::Shutdown(_)))
            .unwrap();
        let erase = calls
            .iter()
            .position(|c| matches!(c, HostCall::Erase(_)))
            .unwrap();
        assert!(shutdown < erase);
    }

    #[tokio::test]
    async fn test_erase_propagates_shutdown_failure() {
        let (host, sim) = host();
        host.fail_next("shutdown");
        assert!(sim.erase().await.is_err());
        assert!(!host.calls().iter().any(|c| matches!(c, HostCall::Erase(_))));
    }

    #[tokio::test]
    async fn test_clone_resolves_through_registry() {
        let (host, sim) = host();
        let clone = sim.clone_as("iPhone 15 Clone 0", false, &host).await.unwrap();

        assert_eq!(clone.name(), "iPhone 15 Clone 0");
        assert_eq!(clone.runtime(), sim.runtime());
        assert_ne!(clone, sim);
    }

    #[tokio::test]
    async fn test_clone_erase_failure_deletes_clone() {
        let (host, sim) = host();
        host.fail_next("erase");

        let err = sim.clone_as("iPhone 15 Clone 0", true, &host).await;
        assert!(err.is_err());
        assert!(host.device_named("iPhone 15 Clone 0").is_none());
    }

    #[tokio::test]
    async fn test_clone_not_in_registry() {
        let (host, sim) = host();
        host.hide_clones();

        let err = sim.clone_as("iPhone 15 Clone 0", false, &host).await.unwrap_err();
        assert!(matches!(err, SimulatorError::ClonedEnvironmentNotFound { .. }));
    }

    #[test]
    fn test_parse_clone_identifier() {
        assert!(matches!(
            parse_clone_identifier("x", "  \n"),
            Err(SimulatorError::CloneDidNotReturnIdentifier { .. })
        ));
        assert!(matches!(
            parse_clone_identifier("x", "Invalid device state"),
            Err(SimulatorError::CloneReturnedInvalidIdentifier { .. })
        ));
        assert_eq!(
            parse_clone_identifier("x", "5a1b9c6e-2f0d-4c2b-9a8e-7d1c3b2a1f00\n").unwrap(),
            "5A1B9C6E-2F0D-4C2B-9A8E-7D1C3B2A1F00"
        );
    }

    #[tokio::test]
    async fn test_input_assist_only_on_recent_ios() {
        let host = InMemoryHost::new();
        let ios12 = host.add_runtime("iOS", "12.4");
        let tvos = host.add_runtime("tvOS", "17.2");
        let ios17 = host.add_runtime("iOS", "17.2");

        for runtime in [&ios12, &tvos] {
            let udid = host.add_device("Old", runtime);
            host.simulator(&udid)
                .unwrap()
                .disable_auto_input_assist()
                .await
                .unwrap();
        }
        assert!(host.defaults_written().is_empty());

        let udid = host.add_device("New", &ios17);
        host.simulator(&udid)
            .unwrap()
            .disable_auto_input_assist()
            .await
            .unwrap();
        assert_eq!(host.defaults_written().len(), INPUT_ASSIST_KEYS.len());
    }
}

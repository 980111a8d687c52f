//! Fleet cloner: named, reusable clones of a reference simulator

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SimulatorError};
use crate::registry::DeviceRegistry;
use crate::simulator::Simulator;

/// Marker every clone name carries
pub const CLONE_MARKER: &str = "Clone";

/// How a fleet should be provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    pub count: usize,
    /// Boot every clone once all of them exist
    pub preboot: bool,
    /// Wipe clones left over from a previous run before reusing them
    pub erase_existing: bool,
    /// Wipe clones created by this call
    pub erase_newly_cloned: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            count: 2,
            preboot: true,
            erase_existing: true,
            erase_newly_cloned: false,
        }
    }
}

/// Deterministic display name of clone `index` of `reference`
pub fn clone_name(reference: &Simulator, index: usize) -> String {
    format!("{} {} {}", reference.name(), CLONE_MARKER, index)
}

/// Provisions and tears down clone fleets
#[async_trait]
pub trait FleetProvider: Send + Sync {
    /// Resolve `options.count` clones of `reference`, in index order.
    ///
    /// Any provisioning failure aborts the whole fleet.
    async fn make_clones(
        &self,
        reference: &Simulator,
        options: &CloneOptions,
    ) -> Result<Vec<Simulator>>;

    /// Delete every simulator whose name marks it as a clone, returning how
    /// many were removed
    async fn delete_all_clones(&self) -> Result<usize>;
}

/// [`FleetProvider`] working through a [`DeviceRegistry`]
#[derive(Clone)]
pub struct SimulatorCloner {
    registry: Arc<dyn DeviceRegistry>,
}

impl SimulatorCloner {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }

    async fn resolve_clone(
        &self,
        reference: &Simulator,
        existing: &[Simulator],
        index: usize,
        options: &CloneOptions,
    ) -> Result<Simulator> {
        let name = clone_name(reference, index);

        if let Some(found) = existing.iter().find(|s| s.name() == name) {
            if found.runtime().identifier != reference.runtime().identifier {
                info!(
                    udid = %found.udid(),
                    name = %name,
                    found_runtime = %found.runtime().identifier,
                    wanted_runtime = %reference.runtime().identifier,
                    "clone runtime differs from reference, recreating"
                );
                found.delete().await?;
            } else {
                debug!(udid = %found.udid(), name = %name, "reusing existing clone");
                if options.erase_existing {
                    found.erase().await?;
                }
                return Ok(found.clone());
            }
        }

        reference
            .clone_as(&name, options.erase_newly_cloned, self.registry.as_ref())
            .await
    }

    async fn preboot(clones: &[Simulator]) {
        let handles: Vec<_> = clones
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, clone)| {
                tokio::spawn(async move {
                    if let Err(e) = clone.boot().await {
                        warn!(clone = index, udid = %clone.udid(), error = %e, "failed to preboot clone");
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "preboot task panicked");
            }
        }
    }
}

#[async_trait]
impl FleetProvider for SimulatorCloner {
    #[instrument(skip(self, reference), fields(reference = %reference.udid(), count = options.count))]
    async fn make_clones(
        &self,
        reference: &Simulator,
        options: &CloneOptions,
    ) -> Result<Vec<Simulator>> {
        // A running source device cannot be cloned
        reference.shutdown().await?;

        let existing = self.registry.list_devices().await?;
        let mut clones = Vec::with_capacity(options.count);
        for index in 0..options.count {
            let clone = self
                .resolve_clone(reference, &existing, index, options)
                .await?;
            clones.push(clone);
        }

        if options.preboot {
            Self::preboot(&clones).await;
        }

        info!(count = clones.len(), "fleet ready");
        Ok(clones)
    }

    #[instrument(skip(self))]
    async fn delete_all_clones(&self) -> Result<usize> {
        let devices = match self.registry.list_devices().await {
            Ok(devices) => devices,
            Err(SimulatorError::NoDevicesFound) => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut deleted = 0;
        for clone in devices.iter().filter(|s| s.name().contains(CLONE_MARKER)) {
            match clone.delete().await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(udid = %clone.udid(), name = %clone.name(), error = %e, "failed to delete clone"),
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{HostCall, InMemoryHost};

    fn setup() -> (InMemoryHost, Simulator, SimulatorCloner) {
        let host = InMemoryHost::new();
        let ios17 = host.add_runtime("iOS", "17.2");
        let udid = host.add_device("iPhone 15", &ios17);
        let reference = host.simulator(&udid).unwrap();
        let cloner = SimulatorCloner::new(Arc::new(host.clone()));
        (host, reference, cloner)
    }

    fn options(count: usize) -> CloneOptions {
        CloneOptions {
            count,
            preboot: false,
            erase_existing: true,
            erase_newly_cloned: false,
        }
    }

    #[tokio::test]
    async fn test_clones_are_named_by_index() {
        let (_, reference, cloner) = setup();
        let clones = cloner.make_clones(&reference, &options(3)).await.unwrap();

        let names: Vec<&str> = clones.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            ["iPhone 15 Clone 0", "iPhone 15 Clone 1", "iPhone 15 Clone 2"]
        );
    }

    #[tokio::test]
    async fn test_make_clones_twice_reuses_devices() {
        let (host, reference, cloner) = setup();
        let first = cloner.make_clones(&reference, &options(2)).await.unwrap();
        let second = cloner.make_clones(&reference, &options(2)).await.unwrap();

        let first: Vec<&str> = first.iter().map(|c| c.udid()).collect();
        let second: Vec<&str> = second.iter().map(|c| c.udid()).collect();
        assert_eq!(first, second);
        assert_eq!(host.devices().len(), 3);
    }

    #[tokio::test]
    async fn test_runtime_mismatch_recreates_clone() {
        let (host, reference, cloner) = setup();
        let ios16 = host.add_runtime("iOS", "16.4");
        let stale = host.add_device("iPhone 15 Clone 0", &ios16);

        let clones = cloner.make_clones(&reference, &options(1)).await.unwrap();

        assert_ne!(clones[0].udid(), stale);
        assert_eq!(clones[0].runtime(), reference.runtime());
        assert!(host.calls().contains(&HostCall::Delete(stale)));
    }

    #[tokio::test]
    async fn test_existing_clone_erased_when_requested() {
        let (host, reference, cloner) = setup();
        let first = cloner.make_clones(&reference, &options(1)).await.unwrap();
        cloner.make_clones(&reference, &options(1)).await.unwrap();

        let erase = HostCall::Erase(first[0].udid().to_string());
        assert!(host.calls().contains(&erase));
    }

    #[tokio::test]
    async fn test_preboot_failure_does_not_abort_batch() {
        let (host, reference, cloner) = setup();
        let clones = cloner.make_clones(&reference, &options(2)).await.unwrap();
        host.fail_on("boot", clones[0].udid());

        let opts = CloneOptions {
            preboot: true,
            erase_existing: false,
            ..options(2)
        };
        let clones = cloner.make_clones(&reference, &opts).await.unwrap();

        assert_eq!(clones.len(), 2);
        assert!(!host.is_booted(clones[0].udid()));
        assert!(host.is_booted(clones[1].udid()));
    }

    #[tokio::test]
    async fn test_provisioning_failure_aborts_fleet() {
        let (host, reference, cloner) = setup();
        host.hide_clones();

        let err = cloner.make_clones(&reference, &options(2)).await.unwrap_err();
        assert!(matches!(err, SimulatorError::ClonedEnvironmentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_all_clones_is_best_effort() {
        let (host, reference, cloner) = setup();
        let clones = cloner.make_clones(&reference, &options(3)).await.unwrap();
        host.fail_on("delete", clones[1].udid());

        let deleted = cloner.delete_all_clones().await.unwrap();

        assert_eq!(deleted, 2);
        let remaining: Vec<String> = host.devices().into_iter().map(|d| d.name).collect();
        assert_eq!(remaining, ["iPhone 15", "iPhone 15 Clone 1"]);
    }
}

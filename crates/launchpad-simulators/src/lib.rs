//! Launchpad Simulators - discovery, lifecycle and fleet cloning
//!
//! Layers, leaf first:
//!
//! - [`catalog`]: installed runtimes ([`RuntimeCatalog`])
//! - [`registry`]: instantiated devices joined with their runtime ([`DeviceRegistry`])
//! - [`simulator`]: the [`Simulator`] handle and its lifecycle operations
//! - [`cloner`]: named clone fleets ([`FleetProvider`])
//!
//! Everything that touches the host goes through `xcrun simctl` via a
//! [`launchpad_core::ProcessRunner`].

pub mod catalog;
pub mod cloner;
pub mod control;
pub mod device;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod registry;
pub mod runtime;
pub mod simulator;

use std::sync::Arc;

use launchpad_core::ProcessRunner;

pub use catalog::{RuntimeCatalog, SimctlCatalog};
pub use cloner::{clone_name, CloneOptions, FleetProvider, SimulatorCloner};
pub use control::{Simctl, SimulatorControl};
pub use device::{Device, DeviceState};
pub use error::{Result, SimulatorError};
pub use registry::{select_reference, DeviceRegistry, SimctlRegistry};
pub use runtime::Runtime;
pub use simulator::Simulator;

/// Production wiring of every simulator component over one runner
#[derive(Clone)]
pub struct SimulatorHost {
    pub catalog: Arc<dyn RuntimeCatalog>,
    pub registry: Arc<dyn DeviceRegistry>,
    pub control: Arc<dyn SimulatorControl>,
    pub fleet: Arc<dyn FleetProvider>,
}

impl SimulatorHost {
    /// Wire catalog, registry, control and cloner to `simctl`
    pub fn simctl(runner: Arc<dyn ProcessRunner>) -> Self {
        let catalog: Arc<dyn RuntimeCatalog> = Arc::new(SimctlCatalog::new(runner.clone()));
        let control: Arc<dyn SimulatorControl> = Arc::new(Simctl::new(runner.clone()));
        let registry: Arc<dyn DeviceRegistry> =
            Arc::new(SimctlRegistry::new(runner, catalog.clone(), control.clone()));
        let fleet: Arc<dyn FleetProvider> = Arc::new(SimulatorCloner::new(registry.clone()));
        Self {
            catalog,
            registry,
            control,
            fleet,
        }
    }

    /// Wire every component to one in-memory host
    #[cfg(any(test, feature = "test-support"))]
    pub fn in_memory(host: &fake::InMemoryHost) -> Self {
        let registry: Arc<dyn DeviceRegistry> = Arc::new(host.clone());
        Self {
            catalog: Arc::new(host.clone()),
            control: Arc::new(host.clone()),
            fleet: Arc::new(SimulatorCloner::new(registry.clone())),
            registry,
        }
    }
}

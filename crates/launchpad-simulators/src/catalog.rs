//! Environment catalog: installed simulator runtimes

use std::sync::Arc;

use async_trait::async_trait;
use launchpad_core::{CommandSpec, ProcessRunner};
use tracing::{debug, instrument};

use crate::error::{Result, SimulatorError};
use crate::runtime::{Runtime, RuntimeList};

/// Source of installed runtimes
#[async_trait]
pub trait RuntimeCatalog: Send + Sync {
    /// List every installed runtime.
    ///
    /// Fails with [`SimulatorError::NoRuntimesFound`] when the list is empty
    /// and [`SimulatorError::DiscoveryUnavailable`] when the tool output
    /// cannot be parsed.
    async fn list_runtimes(&self) -> Result<Vec<Runtime>>;
}

/// [`RuntimeCatalog`] backed by `xcrun simctl list runtimes --json`
#[derive(Clone)]
pub struct SimctlCatalog {
    runner: Arc<dyn ProcessRunner>,
}

impl SimctlCatalog {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl RuntimeCatalog for SimctlCatalog {
    #[instrument(skip(self))]
    async fn list_runtimes(&self) -> Result<Vec<Runtime>> {
        let spec = CommandSpec::xcrun(["simctl", "list", "runtimes", "--json"]);
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            return Err(SimulatorError::DiscoveryUnavailable {
                query: "runtimes".to_string(),
                reason: format!("{}: {}", output.termination, output.stderr.trim()),
            });
        }

        parse_runtimes(&output.stdout)
    }
}

/// Decode and normalize a runtime listing
pub fn parse_runtimes(json: &str) -> Result<Vec<Runtime>> {
    if json.trim().is_empty() {
        return Err(SimulatorError::DiscoveryUnavailable {
            query: "runtimes".to_string(),
            reason: "empty output".to_string(),
        });
    }

    let list: RuntimeList =
        serde_json::from_str(json).map_err(|e| SimulatorError::DiscoveryUnavailable {
            query: "runtimes".to_string(),
            reason: e.to_string(),
        })?;

    if list.runtimes.is_empty() {
        return Err(SimulatorError::NoRuntimesFound);
    }

    let runtimes: Vec<Runtime> = list.runtimes.into_iter().map(Runtime::normalized).collect();
    debug!(count = runtimes.len(), "runtimes discovered");
    Ok(runtimes)
}

//! Low-level simulator lifecycle commands
//!
//! [`SimulatorControl`] is the imperative surface of `simctl`, keyed by UDID.
//! Policy (what to tolerate, what order to do things in) lives on
//! [`Simulator`](crate::Simulator); this layer only translates and reports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use launchpad_core::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner};
use tracing::debug;

use crate::error::{Result, SimulatorError};

/// Upper bound for any single simctl lifecycle command
const SIMCTL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Imperative simulator commands
#[async_trait]
pub trait SimulatorControl: Send + Sync {
    async fn boot(&self, udid: &str) -> Result<()>;

    /// Fails with [`SimulatorError::AlreadyShutdown`] when the device is not running
    async fn shutdown(&self, udid: &str) -> Result<()>;

    async fn erase(&self, udid: &str) -> Result<()>;

    async fn delete(&self, udid: &str) -> Result<()>;

    /// Clone `udid` under `name`, returning the tool's raw stdout
    async fn clone_device(&self, udid: &str, name: &str) -> Result<String>;

    async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()>;

    /// Write a boolean user default inside the simulator
    async fn write_default(&self, udid: &str, domain: &str, key: &str, value: bool) -> Result<()>;

    /// Shut down every running simulator on the host
    async fn shutdown_all(&self) -> Result<()>;
}

/// [`SimulatorControl`] backed by `xcrun simctl`
#[derive(Clone)]
pub struct Simctl {
    runner: Arc<dyn ProcessRunner>,
}

impl Simctl {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn simctl(&self, action: &'static str, udid: &str, args: &[&str]) -> Result<ProcessOutput> {
        let spec = CommandSpec::xcrun(["simctl", action])
            .args(args.iter().copied())
            .timeout(SIMCTL_TIMEOUT);
        debug!(action, udid, "simctl");
        self.runner
            .run_checked(&spec)
            .await
            .map_err(|source| SimulatorError::Command {
                action,
                udid: udid.to_string(),
                source,
            })
    }
}

fn is_already_shutdown(err: &ProcessError) -> bool {
    err.stderr().contains("current state: Shutdown")
}

#[async_trait]
impl SimulatorControl for Simctl {
    async fn boot(&self, udid: &str) -> Result<()> {
        match self.simctl("boot", udid, &[udid]).await {
            Ok(_) => Ok(()),
            // Booting a booted device is tolerated
            Err(SimulatorError::Command { source, .. })
                if source.stderr().contains("current state: Booted") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn shutdown(&self, udid: &str) -> Result<()> {
        match self.simctl("shutdown", udid, &[udid]).await {
            Ok(_) => Ok(()),
            Err(SimulatorError::Command { source, .. }) if is_already_shutdown(&source) => {
                Err(SimulatorError::AlreadyShutdown {
                    udid: udid.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn erase(&self, udid: &str) -> Result<()> {
        self.simctl("erase", udid, &[udid]).await.map(|_| ())
    }

    async fn delete(&self, udid: &str) -> Result<()> {
        self.simctl("delete", udid, &[udid]).await.map(|_| ())
    }

    async fn clone_device(&self, udid: &str, name: &str) -> Result<String> {
        let output = self.simctl("clone", udid, &[udid, name]).await?;
        Ok(output.stdout)
    }

    async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.simctl("uninstall", udid, &[udid, bundle_id])
            .await
            .map(|_| ())
    }

    async fn write_default(&self, udid: &str, domain: &str, key: &str, value: bool) -> Result<()> {
        let value = if value { "YES" } else { "NO" };
        self.simctl(
            "spawn",
            udid,
            &[udid, "defaults", "write", domain, key, "-bool", value],
        )
        .await
        .map(|_| ())
    }

    async fn shutdown_all(&self) -> Result<()> {
        self.simctl("shutdown", "all", &["all"]).await.map(|_| ())
    }
}

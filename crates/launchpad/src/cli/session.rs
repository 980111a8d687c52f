//! Wiring shared by every command

use std::sync::Arc;

use launchpad_core::config::{load_config, load_config_from_dir, validate_config};
use launchpad_core::{CancelToken, Config, ProcessRunner, SystemRunner};
use launchpad_simulators::{select_reference, CloneOptions, Simulator, SimulatorHost};
use launchpad_xcode::reporter::{ReporterSet, ScanReporter, TracingReporter};
use launchpad_xcode::scan::shutdown_all;
use launchpad_xcode::{Builder, EngineOptions, OutputPaths, RunPreparation, XcodeTarget, XcodebuildEngine};
use tracing::{info, warn};

use super::output::ConsoleReporter;
use super::Cli;
use crate::exit_codes::Interrupted;

/// Configuration plus the production host, runner and cancellation token
pub struct Session {
    pub config: Config,
    pub runner: Arc<dyn ProcessRunner>,
    pub host: SimulatorHost,
    pub cancel: CancelToken,
}

impl Session {
    /// Session for commands that only talk to simulators
    pub fn host_only() -> Self {
        Self::with_config(Config::default())
    }

    /// Load the project configuration, then apply command-line overrides.
    ///
    /// Overrides are validated like file values.
    pub fn load(cli: &Cli, overrides: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config(path)?,
            None => load_config_from_dir(&std::env::current_dir()?)?.0,
        };
        overrides(&mut config);
        validate_config(&config)?;
        resolve_formatter(&mut config);
        Ok(Self::with_config(config))
    }

    fn with_config(config: Config) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new());
        let host = SimulatorHost::simctl(runner.clone());
        Self {
            config,
            runner,
            host,
            cancel: CancelToken::new(),
        }
    }

    /// On Ctrl-C, cancel in-flight tools and shut every simulator down.
    ///
    /// Must be called from within the runtime.
    pub fn watch_interrupts(&self) {
        let cancel = self.cancel.clone();
        let control = self.host.control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping test runs");
                cancel.cancel();
                shutdown_all(control.as_ref()).await;
            }
        });
    }

    pub fn interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mark `err` as a consequence of Ctrl-C when an interrupt was received
    pub fn tag_interrupt(&self, err: impl Into<anyhow::Error>) -> anyhow::Error {
        let err = err.into();
        if self.interrupted() {
            err.context(Interrupted)
        } else {
            err
        }
    }

    /// The configured reference simulator
    pub async fn reference(&self) -> anyhow::Result<Simulator> {
        let devices = self.host.registry.list_devices().await?;
        let reference = select_reference(
            &devices,
            &self.config.device.name,
            self.config.device.os_version.as_deref(),
        )?;
        info!(reference = %reference, "selected reference simulator");
        Ok(reference)
    }

    pub fn target(&self) -> XcodeTarget {
        XcodeTarget::from_config(&self.config)
    }

    pub fn output(&self) -> OutputPaths {
        OutputPaths::new(&self.config.output_dir)
    }

    pub fn builder(&self) -> Builder {
        Builder::new(self.runner.clone(), self.target(), self.config.output_dir.join("logs"))
            .with_formatter(self.config.test.formatter.clone())
            .with_cancel(self.cancel.clone())
    }

    /// Test engine; `prebuilt` runs against existing build products
    pub fn engine(&self, prebuilt: bool, isolate_derived_data: bool) -> XcodebuildEngine {
        let options = EngineOptions {
            prebuilt,
            isolate_derived_data,
            coverage: self.config.test.coverage,
            timeout: self.config.test.timeout(),
            formatter: self.config.test.formatter.clone(),
            output_dir: self.config.output_dir.clone(),
        };
        XcodebuildEngine::new(self.runner.clone(), self.target(), options).with_cancel(self.cancel.clone())
    }

    pub fn preparation(&self) -> RunPreparation {
        RunPreparation {
            app_identifier: self.config.test.app_identifier.clone(),
            disable_input_assist: self.config.test.disable_input_assist,
        }
    }

    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            count: self.config.fleet.size,
            preboot: self.config.fleet.preboot,
            erase_existing: self.config.fleet.erase_existing,
            erase_newly_cloned: self.config.fleet.erase_new,
        }
    }

    /// Events always go to tracing; text mode adds console progress
    pub fn reporter(&self, cli: &Cli) -> Arc<dyn ScanReporter> {
        let set = ReporterSet::new().with(Arc::new(TracingReporter));
        if cli.shows_progress() {
            Arc::new(set.with(Arc::new(ConsoleReporter::new())))
        } else {
            Arc::new(set)
        }
    }
}

/// Drop the formatter when its program is not installed
fn resolve_formatter(config: &mut Config) {
    let Some(formatter) = config.test.formatter.as_deref() else {
        return;
    };
    let program = formatter.split_whitespace().next().unwrap_or_default();
    if program.is_empty() || which::which(program).is_err() {
        warn!(formatter, "formatter not found on PATH, JUnit reports will not be produced");
        config.test.formatter = None;
    }
}

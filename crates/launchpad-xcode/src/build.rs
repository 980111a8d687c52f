//! Build orchestration with xcodebuild

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use launchpad_core::{CancelToken, CommandSpec, ProcessRunner};
use tracing::{debug, info, instrument, warn};

use crate::destination::Destination;
use crate::error::{Result, XcodeError};
use crate::project::{xcodebuild_pipeline, XcodeTarget};

/// Runs xcodebuild build, archive and housekeeping actions for one target.
///
/// Failures are passed up as [`XcodeError::Tool`] without interpretation.
#[derive(Clone)]
pub struct Builder {
    runner: Arc<dyn ProcessRunner>,
    target: XcodeTarget,
    log_dir: PathBuf,
    formatter: Option<String>,
    cancel: Option<CancelToken>,
}

impl Builder {
    pub fn new(runner: Arc<dyn ProcessRunner>, target: XcodeTarget, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            target,
            log_dir: log_dir.into(),
            formatter: None,
            cancel: None,
        }
    }

    /// Pipe build output through `formatter`
    pub fn with_formatter(mut self, formatter: Option<String>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn target(&self) -> &XcodeTarget {
        &self.target
    }

    /// Shared build output directory
    pub fn derived_data(&self) -> &Path {
        &self.target.derived_data
    }

    /// `build` or `build-for-testing` against `destination`
    #[instrument(skip(self), fields(scheme = %self.target.scheme, destination = %destination))]
    pub async fn build(&self, for_testing: bool, destination: &Destination) -> Result<()> {
        let action = if for_testing { "build-for-testing" } else { "build" };
        let mut args = self.target.base_args(&self.target.derived_data);
        args.extend(["-destination".to_string(), destination.to_arg(), action.to_string()]);
        self.run_logged(action, args).await
    }

    /// Archive for a generic device into `archive_path`
    #[instrument(skip(self), fields(scheme = %self.target.scheme))]
    pub async fn archive(&self, archive_path: &Path) -> Result<()> {
        let mut args = self.target.base_args(&self.target.derived_data);
        args.extend([
            "-destination".to_string(),
            Destination::generic_ios().to_arg(),
            "-archivePath".to_string(),
            archive_path.to_string_lossy().into_owned(),
            "archive".to_string(),
        ]);
        self.run_logged("archive", args).await
    }

    /// Resolve Swift package dependencies
    #[instrument(skip(self), fields(scheme = %self.target.scheme))]
    pub async fn resolve_dependencies(&self) -> Result<()> {
        let mut args = self.target.base_args(&self.target.derived_data);
        args.push("-resolvePackageDependencies".to_string());
        self.run_logged("resolve-dependencies", args).await
    }

    /// Raw `-showBuildSettings` output
    pub async fn show_build_settings(&self) -> Result<String> {
        let mut args = self.target.base_args(&self.target.derived_data);
        args.push("-showBuildSettings".to_string());
        let spec = self.command(CommandSpec::new("xcodebuild").args(args));
        let output = self
            .runner
            .run_checked(&spec)
            .await
            .map_err(|e| XcodeError::tool("show-build-settings", e))?;
        Ok(output.stdout)
    }

    /// Remove the shared derived data directory; failures are logged only
    pub async fn clean_derived_data(&self) {
        let dir = &self.target.derived_data;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!(path = %dir.display(), "removed derived data"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %dir.display(), "no derived data to remove")
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove derived data"),
        }
    }

    fn command(&self, spec: CommandSpec) -> CommandSpec {
        match &self.cancel {
            Some(token) => spec.cancel_on(token.clone()),
            None => spec,
        }
    }

    async fn run_logged(&self, action: &str, args: Vec<String>) -> Result<()> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let stdout_log = self.log_dir.join(format!("{}-{}.log", self.target.scheme, action));
        let stderr_log = self.log_dir.join(format!("{}-{}.stderr.log", self.target.scheme, action));

        let script = xcodebuild_pipeline(&args, &stdout_log, self.formatter.as_deref());
        let spec = self.command(CommandSpec::shell(script).stderr_log(&stderr_log));

        let started = Instant::now();
        self.runner
            .run_checked(&spec)
            .await
            .map_err(|e| XcodeError::tool(action, e))?;

        info!(
            action,
            duration_ms = started.elapsed().as_millis() as u64,
            "xcodebuild finished"
        );
        Ok(())
    }
}

//! Launchpad Core - shared plumbing for simulator fleet orchestration
//!
//! This crate owns the pieces every other Launchpad crate leans on:
//!
//! - [`process`]: the [`ProcessRunner`] capability used to invoke `xcrun`,
//!   `xcodebuild` and other external tools, with timeouts and log capture
//! - [`cancel`]: a [`CancelToken`] threaded through long-running work so an
//!   interrupt kills in-flight children instead of orphaning them
//! - [`config`]: the `launchpad.toml` / `launchpad.yaml` model and loader

pub mod cancel;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod process;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{ConfigError, ProcessError};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemRunner, Termination};

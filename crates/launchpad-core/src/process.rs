//! External process execution
//!
//! Every component that shells out to `xcrun`, `xcodebuild` or friends does so
//! through a [`ProcessRunner`] handed to it at construction time. The runner
//! owns timeouts, cancellation and log capture so callers only ever see a
//! [`ProcessOutput`] describing how the child terminated.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;
use crate::error::ProcessError;

/// How long to keep draining pipes after a child has been killed
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// A fully described external command
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Hard wall-clock limit; the child is killed when it elapses
    pub timeout: Option<Duration>,
    /// Every stdout line is appended here as well as captured
    pub stdout_log: Option<PathBuf>,
    /// Every stderr line is appended here as well as captured
    pub stderr_log: Option<PathBuf>,
    pub cancel: Option<CancelToken>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Shorthand for `xcrun <args>`
    pub fn xcrun<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("xcrun").args(args)
    }

    /// Run `script` with bash, failing the pipeline if any stage fails
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("bash").args(["-o", "pipefail", "-c"]).arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdout_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_log = Some(path.into());
        self
    }

    pub fn stderr_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_log = Some(path.into());
        self
    }

    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Render as a single shell-safe command line
    pub fn to_shell_string(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Human-readable form used in logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote an argument for `bash -c` if it contains anything beyond a safe set
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// How a child process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with the given code
    Exited(i32),
    /// Killed by a signal we did not send
    Signalled,
    /// Killed because the wall-clock timeout elapsed
    TimedOut,
    /// Killed because the cancellation token fired
    Cancelled,
}

impl Termination {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {}", code),
            Self::Signalled => f.write_str("killed by signal"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Captured result of a finished child
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination.success()
    }

    /// Convenience constructor for a clean exit
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            termination: Termination::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
        }
    }
}

/// Capability to run external tools
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// Timeouts, cancellation and non-zero exits are reported through
    /// [`ProcessOutput::termination`]; only a failure to start or supervise the
    /// child is an error.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError>;

    /// Run a command and treat anything but exit code zero as an error
    async fn run_checked(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let output = self.run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                command: spec.display(),
                termination: output.termination.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

/// Runs commands on the host with tokio
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();
        debug!(command = %spec.display(), "spawning process");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: spec.display(),
            source,
        })?;

        let stdout_task = tokio::spawn(capture(child.stdout.take(), spec.stdout_log.clone()));
        let stderr_task = tokio::spawn(capture(child.stderr.take(), spec.stderr_log.clone()));

        let timeout = spec.timeout;
        let cancel = spec.cancel.clone();
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            _ = async {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            } => Wake::TimedOut,
            _ = async {
                match &cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            } => Wake::Cancelled,
        };

        let termination = match wake {
            Wake::Exited(status) => {
                let status = status?;
                match status.code() {
                    Some(code) => Termination::Exited(code),
                    None => Termination::Signalled,
                }
            }
            Wake::TimedOut => {
                warn!(command = %spec.display(), ?timeout, "process timed out, killing");
                kill_tree(&mut child).await;
                Termination::TimedOut
            }
            Wake::Cancelled => {
                warn!(command = %spec.display(), "process cancelled, killing");
                kill_tree(&mut child).await;
                Termination::Cancelled
            }
        };

        let stdout = join_capture(stdout_task).await;
        let stderr = join_capture(stderr_task).await;

        let duration = start.elapsed();
        debug!(
            command = %spec.display(),
            %termination,
            duration_ms = duration.as_millis() as u64,
            "process finished"
        );

        Ok(ProcessOutput {
            termination,
            stdout,
            stderr,
            duration,
        })
    }
}

/// Kill the child and everything it spawned into its process group
async fn kill_tree(child: &mut tokio::process::Child) {
    // The group id is the child's pid since it was spawned with process_group(0)
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "process group already gone");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

async fn join_capture(task: tokio::task::JoinHandle<std::io::Result<String>>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed to capture process output");
            String::new()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "output capture task failed");
            String::new()
        }
        Err(_) => {
            abort.abort();
            warn!("output pipe still open after process exit, giving up");
            String::new()
        }
    }
}

/// Read a pipe line by line, mirroring it into an optional log file
async fn capture<R>(reader: Option<R>, log: Option<PathBuf>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut file = match log {
        Some(path) => Some(open_log(&path).await?),
        None => None,
    };

    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if let Some(file) = file.as_mut() {
            file.write_all(&buf).await?;
        }
        let line = String::from_utf8_lossy(&buf);
        trace!(line = %line.trim_end());
        captured.push_str(&line);
    }

    if let Some(file) = file.as_mut() {
        file.flush().await?;
    }

    Ok(captured)
}

async fn open_log(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

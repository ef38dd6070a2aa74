//! Bounded execution of external tools.
//!
//! Every external binary (yosys, iverilog, vvp, the OpenLane wrapper) goes
//! through [`ProcessRunner::run`]. A run either returns the captured output of
//! a successful exit or exactly one [`ProcessError`]. When the timeout fires,
//! the child's whole process group is killed and the child is reaped before
//! the error is returned. Dropping the run future early (an aborted request
//! task) also kills the group.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Budget for long physical-design flows.
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(600);

/// Budget for quick tool invocations (synthesis, compile, simulation run).
pub const DEFAULT_QUICK_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-stream capture bound.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Invalid timeout for '{command}': budget must be a positive duration")]
    InvalidTimeout { command: String },

    #[error("Failed to launch '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("Command '{command}' timed out after {} ms", .budget.as_millis())]
    Timeout { command: String, budget: Duration },

    #[error("Command '{command}' exited with status {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command '{command}' produced more than {limit} bytes on {stream}")]
    OutputLimitExceeded {
        command: String,
        stream: OutputStream,
        limit: usize,
    },

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

/// One external command execution. Transient: built per call, never stored.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment_overrides: BTreeMap<String, String>,
    pub timeout_budget: Duration,
}

impl ProcessInvocation {
    pub fn new(command: impl Into<String>, timeout_budget: Duration) -> Self {
        Self {
            command: command.into(),
            arguments: Vec::new(),
            working_directory: None,
            environment_overrides: BTreeMap::new(),
            timeout_budget,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_overrides.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment_overrides
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Command and arguments as a single display string for errors and logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

enum CaptureError {
    Overflow(OutputStream),
    Io(std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    pub async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput, ProcessError> {
        let command_line = invocation.command_line();
        if invocation.timeout_budget.is_zero() {
            return Err(ProcessError::InvalidTimeout {
                command: command_line,
            });
        }

        let mut std_cmd = std::process::Command::new(&invocation.command);
        std_cmd
            .args(&invocation.arguments)
            .envs(&invocation.environment_overrides)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_directory {
            std_cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a timeout can take down tool subprocesses too
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        debug!(
            "Spawning '{}' (timeout: {} ms)",
            command_line,
            invocation.timeout_budget.as_millis()
        );
        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
            command: command_line.clone(),
            source,
        })?;
        debug!("Process spawned with PID: {:?}", child.id());
        let mut group = ProcessGroupGuard { pgid: child.id() };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        let collected = tokio::time::timeout(invocation.timeout_budget, async {
            let (out, err) = tokio::try_join!(
                read_bounded(stdout, limit, OutputStream::Stdout),
                read_bounded(stderr, limit, OutputStream::Stderr),
            )?;
            let status = child.wait().await.map_err(CaptureError::Io)?;
            Ok::<_, CaptureError>((status, out, err))
        })
        .await;

        let result = match collected {
            Ok(Ok((status, out, err))) => {
                let elapsed = started.elapsed();
                let exit_code = status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&out).into_owned();
                let stderr = String::from_utf8_lossy(&err).into_owned();
                info!(
                    "'{}' finished with status {} in {} ms",
                    command_line,
                    exit_code,
                    elapsed.as_millis()
                );

                if status.success() {
                    Ok(ProcessOutput {
                        exit_code,
                        stdout,
                        stderr,
                        elapsed,
                    })
                } else {
                    Err(ProcessError::NonZeroExit {
                        command: command_line,
                        exit_code,
                        stdout,
                        stderr,
                    })
                }
            }
            Ok(Err(CaptureError::Overflow(stream))) => {
                warn!(
                    "'{}' exceeded {} bytes on {}, killing process group",
                    command_line, limit, stream
                );
                terminate(&mut child, &command_line).await;
                Err(ProcessError::OutputLimitExceeded {
                    command: command_line,
                    stream,
                    limit,
                })
            }
            Ok(Err(CaptureError::Io(source))) => {
                terminate(&mut child, &command_line).await;
                Err(ProcessError::Io {
                    command: command_line,
                    source,
                })
            }
            Err(_) => {
                warn!(
                    "'{}' timed out after {} ms, killing process group",
                    command_line,
                    invocation.timeout_budget.as_millis()
                );
                terminate(&mut child, &command_line).await;
                Err(ProcessError::Timeout {
                    command: command_line,
                    budget: invocation.timeout_budget,
                })
            }
        };

        // The child has been reaped, its pid may be reused from here on
        group.disarm();
        result
    }
}

/// Kills the child's process group when a run is dropped before the child
/// was reaped. `kill_on_drop` alone only reaches the direct child.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            warn!("Run dropped before completion, killing process group {}", pgid);
            kill_process_group(pgid);
        }
    }
}

async fn read_bounded<R>(
    reader: Option<R>,
    limit: usize,
    stream: OutputStream,
) -> Result<Vec<u8>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buffer = Vec::new();
    let mut limited = reader.take(limit as u64 + 1);
    limited
        .read_to_end(&mut buffer)
        .await
        .map_err(CaptureError::Io)?;

    if buffer.len() > limit {
        return Err(CaptureError::Overflow(stream));
    }
    Ok(buffer)
}

/// Kill the child's process group, then kill and reap the child itself.
/// Returns only once the child has been waited on.
async fn terminate(child: &mut Child, command_line: &str) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill '{}': {}", command_line, e);
    }
    debug!("'{}' terminated", command_line);
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", raw, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

//! Host-side command executor
//!
//! Spawns a child process, drains stdout/stderr concurrently as the bytes
//! arrive, and resolves once the process exits. By default there is no
//! timeout and no output bound, so a hung or chatty command holds its caller
//! indefinitely; both limits are opt-in through [`ExecutorConfig`].

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::command_line::{program_exists, split_command_line, CommandSpec};
use crate::metrics::{COMMAND_DURATION, COMMAND_EXECUTIONS};

/// Outcome of one command invocation
///
/// Ephemeral: it is returned to the caller and never stored in the
/// conversation history on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// The command as the caller supplied it
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Spawn-to-exit wall-clock time in milliseconds
    pub duration_ms: f64,
    /// Whether output beyond `max_output_bytes` was discarded
    #[serde(default)]
    pub truncated: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A chunk of output observed while a command runs
#[derive(Debug, Clone, PartialEq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Error type for command execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("empty command")]
    EmptyCommand,
    #[error("command not found: {program}")]
    NotFound { program: String },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} timed out after {after:?}")]
    TimedOut { command: String, after: Duration },
    #[error("{command} was cancelled")]
    Cancelled { command: String },
}

/// Shell used for raw command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub program: String,
    pub flag: String,
}

impl Default for ShellConfig {
    #[cfg(not(windows))]
    fn default() -> Self {
        Self {
            program: "/bin/sh".to_string(),
            flag: "-c".to_string(),
        }
    }

    #[cfg(windows)]
    fn default() -> Self {
        Self {
            program: "cmd".to_string(),
            flag: "/C".to_string(),
        }
    }
}

/// Configuration for the command executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorConfig {
    /// Kill the child after this long (`None` waits forever)
    pub timeout: Option<Duration>,
    /// Keep at most this many bytes per stream (`None` keeps everything)
    pub max_output_bytes: Option<usize>,
    /// Shell that interprets raw command lines
    pub shell: ShellConfig,
}

/// Runs OS commands on behalf of the agent
///
/// Commands run with the privileges of the host process; nothing is
/// sandboxed.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a raw command line through the shell
    ///
    /// The line is split on whitespace and the program token is checked
    /// before anything is spawned, so a missing executable is reported as
    /// [`ExecutionError::NotFound`] instead of a shell exit status.
    pub async fn execute(&self, command_line: &str) -> Result<CommandResult, ExecutionError> {
        self.execute_with(command_line, &CancellationToken::new(), None)
            .await
    }

    /// Like [`execute`](Self::execute), forwarding output chunks as they arrive
    /// and aborting when `token` is cancelled
    pub async fn execute_with(
        &self,
        command_line: &str,
        token: &CancellationToken,
        output: Option<UnboundedSender<OutputChunk>>,
    ) -> Result<CommandResult, ExecutionError> {
        let spec = split_command_line(command_line).ok_or(ExecutionError::EmptyCommand)?;
        if !program_exists(&spec.program) {
            COMMAND_EXECUTIONS.with_label_values(&["error"]).inc();
            return Err(ExecutionError::NotFound {
                program: spec.program,
            });
        }

        let mut cmd = Command::new(&self.config.shell.program);
        cmd.arg(&self.config.shell.flag).arg(spec.display());

        self.run(command_line.to_string(), &spec.program, cmd, token, output)
            .await
    }

    /// Spawn a program directly with an explicit argument vector (no shell)
    pub async fn execute_argv(&self, spec: &CommandSpec) -> Result<CommandResult, ExecutionError> {
        self.execute_argv_with(spec, &CancellationToken::new(), None)
            .await
    }

    pub async fn execute_argv_with(
        &self,
        spec: &CommandSpec,
        token: &CancellationToken,
        output: Option<UnboundedSender<OutputChunk>>,
    ) -> Result<CommandResult, ExecutionError> {
        if spec.program.trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);

        self.run(spec.display(), &spec.program, cmd, token, output)
            .await
    }

    async fn run(
        &self,
        command: String,
        program: &str,
        mut cmd: Command,
        token: &CancellationToken,
        output: Option<UnboundedSender<OutputChunk>>,
    ) -> Result<CommandResult, ExecutionError> {
        let span = info_span!("command_execution", command = %command, otel.name = "command_execution");

        async {
            info!(command = %command, "Executing command");
            let start = Instant::now();

            // Own process group, so a timeout or cancel reaches everything
            // the command started and not just the shell.
            #[cfg(unix)]
            cmd.process_group(0);

            let mut child = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| {
                    COMMAND_EXECUTIONS.with_label_values(&["error"]).inc();
                    warn!(program, error = %source, "Failed to spawn command");
                    ExecutionError::Spawn {
                        program: program.to_string(),
                        source,
                    }
                })?;

            let stdout_handle = child.stdout.take();
            let stderr_handle = child.stderr.take();
            let limit = self.config.max_output_bytes;
            let deadline = self.config.timeout;

            let outcome = tokio::select! {
                result = async {
                    let (status, stdout, stderr) = tokio::join!(
                        child.wait(),
                        drain(stdout_handle, limit, output.clone(), OutputChunk::Stdout),
                        drain(stderr_handle, limit, output.clone(), OutputChunk::Stderr),
                    );
                    Ok::<_, std::io::Error>((status?, stdout?, stderr?))
                } => result.map_err(|source| ExecutionError::Io {
                    command: command.clone(),
                    source,
                }),
                () = sleep_or_forever(deadline) => {
                    terminate(&mut child).await;
                    Err(ExecutionError::TimedOut {
                        command: command.clone(),
                        after: deadline.unwrap_or_default(),
                    })
                }
                () = token.cancelled() => {
                    terminate(&mut child).await;
                    Err(ExecutionError::Cancelled {
                        command: command.clone(),
                    })
                }
            };

            let duration = start.elapsed();
            COMMAND_DURATION.observe(duration.as_secs_f64());

            let (status, (stdout, stdout_truncated), (stderr, stderr_truncated)) = match outcome {
                Ok(parts) => parts,
                Err(e) => {
                    let label = match e {
                        ExecutionError::TimedOut { .. } => "timeout",
                        ExecutionError::Cancelled { .. } => "cancelled",
                        _ => "error",
                    };
                    COMMAND_EXECUTIONS.with_label_values(&[label]).inc();
                    warn!(command = %command, error = %e, "Command did not complete");
                    return Err(e);
                }
            };

            let exit_code = status.code();
            let label = match exit_code {
                Some(0) => "success",
                Some(_) => "failure",
                None => "signal",
            };
            COMMAND_EXECUTIONS.with_label_values(&[label]).inc();

            let duration_ms = duration.as_secs_f64() * 1000.0;
            debug!(command = %command, ?exit_code, duration_ms, "Command finished");

            Ok(CommandResult {
                command: command.clone(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code,
                duration_ms,
                truncated: stdout_truncated || stderr_truncated,
            })
        }
        .instrument(span)
        .await
    }
}

/// Kill the child's whole process group, then the child itself, and reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "Failed to signal process group");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Failed to kill child");
    }
}

async fn sleep_or_forever(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Read a child stream to EOF, keeping at most `limit` bytes
///
/// Reading continues past the limit so the child never blocks on a full
/// pipe; the excess is discarded.
async fn drain<R>(
    reader: Option<R>,
    limit: Option<usize>,
    sink: Option<UnboundedSender<OutputChunk>>,
    wrap: fn(String) -> OutputChunk,
) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut truncated = false;
    let Some(mut reader) = reader else {
        return Ok((buf, truncated));
    };

    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if let Some(tx) = &sink {
            let _ = tx.send(wrap(String::from_utf8_lossy(&chunk[..n]).into_owned()));
        }
        match limit {
            Some(max) if buf.len() + n > max => {
                let room = max.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..room]);
                truncated = true;
            }
            _ => buf.extend_from_slice(&chunk[..n]),
        }
    }
    Ok((buf, truncated))
}

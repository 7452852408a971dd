//! ABOUTME: Allow-listed command execution with timeouts and bounded output
//! ABOUTME: Spawns each command in its own process group and kills the group on deadline

use crate::{allowlist::AllowedCommand, escape::render_command_line, validate::resolve_safe_path};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Serialize;
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, info, instrument, warn};
use vb_core::{telemetry::security_event, Error, MonotonicTimer, Result};

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = vb_config::MAX_COMMAND_TIMEOUT_SECS;

/// Maximum bytes to capture from stdout/stderr
const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024; // 1MB

const MAX_ARGS: usize = 64;
const MAX_ARG_LEN: usize = 4096;
const READ_CHUNK: usize = 8192;

/// Request to run one allow-listed command
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    /// Falls back to the executor default when unset
    pub timeout_secs: Option<u64>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            stdin: None,
            timeout_secs: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Result of one command execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecOutput {
    /// Shell-quoted rendering of what was run
    pub command_line: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    /// stdout if non-empty, otherwise stderr
    pub output: String,
    /// Populated only when the command did not exit cleanly
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Anything that can run an [`ExecRequest`]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput>;
}

/// Executor tuning, usually built from [`vb_config::ExecutorConfig`]
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_timeout_secs: u64,
    pub output_limit_bytes: usize,
    pub kill_grace: Duration,
    pub bin_dir: Option<PathBuf>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            kill_grace: Duration::from_millis(500),
            bin_dir: None,
        }
    }
}

impl From<&vb_config::ExecutorConfig> for ExecutorSettings {
    fn from(config: &vb_config::ExecutorConfig) -> Self {
        Self {
            default_timeout_secs: config.default_timeout_secs,
            output_limit_bytes: config.output_limit_bytes,
            kill_grace: Duration::from_millis(config.kill_grace_ms),
            bin_dir: config.bin_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// Runs allow-listed binaries as child processes
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    settings: ExecutorSettings,
}

impl CommandExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    fn resolve_program(&self, command: AllowedCommand) -> Result<PathBuf> {
        match &self.settings.bin_dir {
            Some(dir) => resolve_safe_path(dir, command.as_str()),
            None => Ok(PathBuf::from(command.as_str())),
        }
    }

    /// Send SIGTERM to the group, then SIGKILL once the grace period lapses
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        if let Some(pid) = pid {
            signal_group(pid, GroupSignal::Term);
        }

        let status = match timeout(self.settings.kill_grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => {
                warn!(?pid, "Process ignored SIGTERM, sending SIGKILL");
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "start_kill failed");
                }
                child.wait().await.ok()
            }
        };

        // Sweep anything else left in the group
        if let Some(pid) = pid {
            signal_group(pid, GroupSignal::Kill);
        }
        status
    }
}

fn validate_timeout(secs: u64) -> Result<()> {
    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(Error::Validation(format!(
            "Timeout must be between {} and {} seconds, got {}",
            MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(())
}

fn validate_args(args: &[String]) -> Result<()> {
    if args.len() > MAX_ARGS {
        return Err(Error::Validation(format!(
            "Too many arguments: {} (max {})",
            args.len(),
            MAX_ARGS
        )));
    }
    for arg in args {
        if arg.contains('\0') {
            return Err(Error::Validation(
                "Arguments must not contain NUL bytes".to_string(),
            ));
        }
        if arg.len() > MAX_ARG_LEN {
            return Err(Error::Validation(format!(
                "Argument exceeds {} bytes",
                MAX_ARG_LEN
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Executor for CommandExecutor {
    #[instrument(skip(self, request), fields(command = %request.command))]
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput> {
        let timeout_secs = request
            .timeout_secs
            .unwrap_or(self.settings.default_timeout_secs);
        validate_timeout(timeout_secs)?;

        let command = match AllowedCommand::from_name(&request.command) {
            Some(command) => command,
            None => {
                counter!("command_rejected_total").increment(1);
                security_event(
                    "command_not_allowed",
                    &format!(
                        "command={:?} arg_count={}",
                        request.command,
                        request.args.len()
                    ),
                );
                return Err(Error::CommandNotAllowed(request.command));
            }
        };

        validate_args(&request.args)?;

        debug!(
            command = %command,
            arg_count = request.args.len(),
            timeout_secs,
            has_stdin = request.stdin.is_some(),
            "Executing command"
        );

        let program = self.resolve_program(command)?;
        let command_line = render_command_line(command.as_str(), &request.args);
        let timer = MonotonicTimer::new();

        let mut cmd = Command::new(&program);
        cmd.args(&request.args)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("LC_ALL", "C")
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("Failed to spawn {}: {}", command, e)))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Process("Failed to capture stderr".to_string()))?;

        // The payload is written in full and the pipe closed so the child
        // sees EOF; this runs alongside the readers so a chatty child cannot
        // deadlock against a full stdout pipe.
        let stdin_task = match (child.stdin.take(), request.stdin) {
            (Some(mut pipe), Some(payload)) => Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&payload).await {
                    debug!(error = %e, "Child closed stdin early");
                }
                drop(pipe);
            })),
            _ => None,
        };

        let limit = self.settings.output_limit_bytes;
        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let mut stdout_task = tokio::spawn(pump(stdout, stdout_buf.clone(), limit, "stdout"));
        let mut stderr_task = tokio::spawn(pump(stderr, stderr_buf.clone(), limit, "stderr"));

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let (status, mut timed_out) = match timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                abort_all(&stdout_task, &stderr_task, stdin_task.as_ref());
                return Err(Error::Process(format!("Failed to wait for {}: {}", command, e)));
            }
            Err(_) => {
                warn!(timeout_secs, ?pid, "Command deadline reached, terminating process group");
                (self.terminate(&mut child, pid).await, true)
            }
        };

        // The group belongs to this call; nothing in it outlives the command
        if let Some(pid) = pid {
            signal_group(pid, GroupSignal::Kill);
        }

        // Readers finish once every holder of the pipes is gone
        let drain_deadline = if timed_out {
            Instant::now() + self.settings.kill_grace
        } else {
            deadline
        };
        let drained = timeout_at(drain_deadline, async {
            let _ = tokio::join!(&mut stdout_task, &mut stderr_task);
        })
        .await;
        if drained.is_err() {
            warn!(?pid, "Output pipes still open after process exit");
            if let Some(pid) = pid {
                signal_group(pid, GroupSignal::Kill);
            }
            timed_out = true;
        }
        abort_all(&stdout_task, &stderr_task, stdin_task.as_ref());

        let duration = timer.elapsed();
        let (stdout, stdout_truncated) = stdout_buf.render(limit);
        let (stderr, stderr_truncated) = stderr_buf.render(limit);
        let exit_code = status.and_then(|s| s.code());

        let error = if timed_out {
            Some(format!("Command timed out after {}s", timeout_secs))
        } else if exit_code == Some(0) {
            None
        } else if !stderr.trim().is_empty() {
            Some(stderr.clone())
        } else {
            match exit_code {
                Some(code) => Some(format!("Command exited with code {}", code)),
                None => Some("Command terminated by signal".to_string()),
            }
        };

        let output = if stdout.is_empty() {
            stderr.clone()
        } else {
            stdout.clone()
        };

        let result = ExecOutput {
            command_line,
            stdout,
            stderr,
            exit_code,
            output,
            error,
            execution_time_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            timed_out,
            stdout_truncated,
            stderr_truncated,
        };

        let name = command.as_str();
        histogram!("command_duration_seconds", "command" => name).record(duration.as_secs_f64());
        if result.timed_out {
            counter!("command_timeout_total", "command" => name).increment(1);
        }
        if result.success() {
            counter!("command_success_total", "command" => name).increment(1);
            info!(
                duration_ms = result.execution_time_ms,
                "Command completed successfully"
            );
        } else {
            counter!("command_failure_total",
                "command" => name,
                "exit_code" => result.exit_code.unwrap_or(-1).to_string())
            .increment(1);
            warn!(
                duration_ms = result.execution_time_ms,
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                "Command failed or timed out"
            );
        }

        Ok(result)
    }
}

fn abort_all(a: &JoinHandle<()>, b: &JoinHandle<()>, c: Option<&JoinHandle<()>>) {
    a.abort();
    b.abort();
    if let Some(c) = c {
        c.abort();
    }
}

/// Captured bytes of one stream, shared with its reader task so partial
/// output survives a timeout
#[derive(Debug, Default, Clone)]
struct SharedBuffer(Arc<Mutex<Captured>>);

#[derive(Debug, Default)]
struct Captured {
    data: Vec<u8>,
    truncated: bool,
}

impl SharedBuffer {
    fn append(&self, chunk: &[u8], limit: usize) {
        let mut captured = self.0.lock().unwrap_or_else(|p| p.into_inner());
        let remaining = limit.saturating_sub(captured.data.len());
        if chunk.len() > remaining {
            captured.data.extend_from_slice(&chunk[..remaining]);
            captured.truncated = true;
        } else {
            captured.data.extend_from_slice(chunk);
        }
    }

    fn is_full(&self, limit: usize) -> bool {
        let captured = self.0.lock().unwrap_or_else(|p| p.into_inner());
        captured.data.len() >= limit
    }

    fn mark_truncated(&self) {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).truncated = true;
    }

    /// Decode as UTF-8 (lossy) and append the truncation marker if needed
    fn render(&self, limit: usize) -> (String, bool) {
        let captured = std::mem::take(&mut *self.0.lock().unwrap_or_else(|p| p.into_inner()));
        let mut text = String::from_utf8_lossy(&captured.data).into_owned();
        if captured.truncated {
            text.push_str(&truncation_marker(limit));
        }
        (text, captured.truncated)
    }
}

pub(crate) fn truncation_marker(limit: usize) -> String {
    format!("\n[output truncated at {} bytes]", limit)
}

/// Read a stream to EOF, keeping at most `limit` bytes and discarding the rest
async fn pump<R>(mut reader: R, sink: SharedBuffer, limit: usize, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut discarded: u64 = 0;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if sink.is_full(limit) {
                    discarded += n as u64;
                    sink.mark_truncated();
                } else {
                    sink.append(&chunk[..n], limit);
                }
            }
            Err(e) => {
                debug!(stream, error = %e, "Error reading from stream");
                break;
            }
        }
    }
    if discarded > 0 {
        debug!(stream, discarded, limit, "Output truncated due to size limit");
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let sig = match signal {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) => debug!(pid, ?signal, "Signalled process group"),
        // ESRCH: the group is already gone
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pid, ?signal, error = %e, "Failed to signal process group"),
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

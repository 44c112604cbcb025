//! External command execution
//!
//! Every program a capability starts goes through [`run_command_safe`] (wait
//! for completion, capture output) or [`spawn_detached`] (fire and forget).
//! The first runs the child in its own process group registered with
//! [`ChildRegistry`], so a timeout or an orchestrator exit takes the whole
//! process tree down with it.

use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::command_args::CommandArgs;
use crate::process_guard::{self, ChildRegistry, CommandProcessGroup};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long pipe readers may keep going once the child has been reaped.
/// A process that escaped the group can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child died from a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        if self.timed_out {
            anyhow::bail!("{} timed out", context);
        }
        anyhow::bail!(
            "{} failed (exit code {}): {}",
            context,
            self.exit_code.unwrap_or(-1),
            self.stderr.trim()
        )
    }

    /// Trimmed stderr, falling back to a description of the exit
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match (self.timed_out, self.exit_code) {
            (true, _) => "command timed out".to_string(),
            (false, Some(code)) => format!("exit code {}", code),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}

/// Whether `err` came from a program that does not exist
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}

/// Run `args` to completion, killing its process group after `timeout`.
pub fn run_command_safe<T: CommandArgs + ?Sized>(args: &T, timeout: Duration) -> Result<CommandOutput> {
    let program = args.program().to_string();
    let cli_args = args.to_cli_args();
    let env_vars = args.get_env_vars();
    tracing::info!(program = %program, args = ?cli_args, "running command");

    let mut cmd = Command::new(&program);
    cmd.args(&cli_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();
    for (key, value) in &env_vars {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;
    let pid = child.id();
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                timed_out = true;
                tracing::warn!(program = %program, pid, ?timeout, "command timed out, killing process group");
                if process_guard::signal_group(pid, Signal::SIGKILL).is_err() {
                    let _ = child.kill();
                }
                break child.wait();
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => break Err(e),
        }
    };

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
    let status = status.with_context(|| format!("Failed waiting for {}", program))?;

    let drain_deadline = Instant::now() + DRAIN_GRACE;
    let output = CommandOutput {
        stdout: collect(&program, stdout, drain_deadline),
        stderr: collect(&program, stderr, drain_deadline),
        exit_code: status.code(),
        success: status.success() && !timed_out,
        timed_out,
    };
    tracing::debug!(program = %program, exit_code = ?output.exit_code, "command finished");
    Ok(output)
}

/// Where a detached launch stands once its settle window has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Running { pid: u32 },
    /// `code` is `None` when the process died from a signal
    Exited { pid: u32, code: Option<i32> },
}

impl LaunchState {
    pub fn pid(&self) -> u32 {
        match *self {
            LaunchState::Running { pid } | LaunchState::Exited { pid, .. } => pid,
        }
    }
}

/// Start `args` in a new session without waiting; returns the child pid.
pub fn spawn_detached<T: CommandArgs + ?Sized>(args: &T) -> Result<u32> {
    launch_detached(args, Duration::ZERO).map(|state| state.pid())
}

/// Start `args` in a new session and watch it for `settle`. A process that
/// exits inside the window is reported with its exit code; one still
/// running is left to a background reaper.
pub fn launch_detached<T: CommandArgs + ?Sized>(args: &T, settle: Duration) -> Result<LaunchState> {
    let program = args.program().to_string();
    let mut cmd = Command::new(&program);
    cmd.args(args.to_cli_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .detached();
    for (key, value) in args.get_env_vars() {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to launch {}", program))?;
    let pid = child.id();
    tracing::info!(program = %program, pid, "launched detached process");

    let deadline = Instant::now() + settle;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            tracing::debug!(program = %program, pid, code = ?status.code(), "detached process exited early");
            return Ok(LaunchState::Exited {
                pid,
                code: status.code(),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // reap in the background so the launcher never leaves a zombie
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(LaunchState::Running { pid })
}

/// Output read so far plus a signal sent once the reader hit EOF
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Drain {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let sink = Arc::clone(&buf);
    std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
            }
        }
        let _ = tx.send(());
    });
    Drain { buf, done }
}

/// Wait for a reader until `deadline`. A reader still blocked after that is
/// abandoned and whatever it captured so far is returned.
fn collect(program: &str, drain: Option<Drain>, deadline: Instant) -> String {
    let Some(drain) = drain else {
        return String::new();
    };
    if drain
        .done
        .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .is_err()
    {
        tracing::warn!(program = %program, "output pipe still held open after exit, abandoning reader");
    }
    let buf = drain.buf.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&buf).into_owned()
}

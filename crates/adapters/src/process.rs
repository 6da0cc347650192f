// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess supervision: process-group spawn, concurrent pipe draining,
//! and a kill-all registry.
//!
//! Every agent CLI invocation goes through [`execute_command`]. The
//! contract it upholds:
//!
//! - stdout and stderr are drained by two concurrent readers that run to
//!   completion before `wait()` is reachable, so output larger than the
//!   OS pipe buffer never stalls the child;
//! - `wait()` is called exactly once per started process on every path,
//!   including cancellation, so no zombies accumulate;
//! - each child gets its own process group, so a single group signal
//!   reaches the whole subtree.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Errors from subprocess execution.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("subprocess i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{description} timed out after {}s", .timeout.as_secs())]
    Timeout {
        description: String,
        timeout: Duration,
    },
    #[error("cancelled")]
    Cancelled,
}

/// Captured output of a completed subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Build a command whose children all live in a dedicated process group.
///
/// The group id equals the child's pid, so a group signal reaches every
/// descendant the child spawns.
pub fn new_command(
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Run a short subprocess with a timeout, collecting its full output.
///
/// Wraps `Command::output()` with `tokio::time::timeout`. The child is
/// killed automatically if the timeout elapses (tokio `Child` drop).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output, ProcessError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(ProcessError::Spawn {
            command: description.to_string(),
            source,
        }),
        Err(_elapsed) => Err(ProcessError::Timeout {
            description: description.to_string(),
            timeout,
        }),
    }
}

/// Start `cmd`, drain both pipes concurrently, then reap it.
///
/// The child is tracked in `pm` (when given) for the duration of the
/// call; untracking happens on every exit path. Cancelling `token` kills
/// the child's whole process group, reaps it, and returns
/// [`ProcessError::Cancelled`].
pub async fn execute_command(
    token: &CancellationToken,
    mut cmd: Command,
    pm: Option<&ProcessManager>,
) -> Result<CommandOutput, ProcessError> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: program,
            source,
        })?;
    let pid = child.id();
    let _tracked = TrackGuard::new(pm, pid);

    drive_child(token, &mut child, pid).await
}

/// Drain both pipes to EOF, then wait. Structurally, `wait()` is
/// unreachable until both readers have finished.
async fn drive_child(
    token: &CancellationToken,
    child: &mut Child,
    pid: Option<u32>,
) -> Result<CommandOutput, ProcessError> {
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let drain = async {
        let stdout_reader = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let stderr_reader = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        tokio::join!(stdout_reader, stderr_reader)
    };

    tokio::select! {
        (stdout, stderr) = drain => {
            let status = child.wait().await?;
            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&stdout?).into_owned(),
                stderr: String::from_utf8_lossy(&stderr?).into_owned(),
                status,
            })
        }
        _ = token.cancelled() => {
            kill_group(pid);
            // Reap exactly once even on the cancellation path.
            let _ = child.wait().await;
            Err(ProcessError::Cancelled)
        }
    }
}

/// SIGKILL an entire process group. Best-effort: the group may already
/// be gone.
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

/// Thread-safe registry of live subprocess groups.
///
/// Tracking happens after a successful spawn; `kill_all` delivers
/// SIGKILL to each tracked group so descendants die with their parents.
#[derive(Debug, Clone, Default)]
pub struct ProcessManager {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, pid: u32) {
        self.pids.lock().insert(pid);
    }

    pub fn untrack(&self, pid: u32) {
        self.pids.lock().remove(&pid);
    }

    pub fn count(&self) -> usize {
        self.pids.lock().len()
    }

    /// Kill every tracked process group.
    pub fn kill_all(&self) {
        let pids: Vec<u32> = self.pids.lock().drain().collect();
        for pid in pids {
            tracing::debug!(pid, "killing process group");
            kill_group(Some(pid));
        }
    }
}

/// Untracks the pid on drop, covering every exit path of
/// [`execute_command`].
struct TrackGuard<'a> {
    pm: Option<&'a ProcessManager>,
    pid: Option<u32>,
}

impl<'a> TrackGuard<'a> {
    fn new(pm: Option<&'a ProcessManager>, pid: Option<u32>) -> Self {
        if let (Some(pm), Some(pid)) = (pm, pid) {
            pm.track(pid);
        }
        Self { pm, pid }
    }
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        if let (Some(pm), Some(pid)) = (self.pm, self.pid) {
            pm.untrack(pid);
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;

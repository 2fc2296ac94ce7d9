//! Cancellable subprocess execution with process-group termination.
//!
//! [`ProcessRunner::run`] drives one external executable to completion or
//! timeout.  The child is spawned into its own process group (unix) so that
//! when the timeout fires the *entire tree* is killed — transcription and
//! refinement backends are known to fork GPU worker processes that would
//! otherwise survive their parent.
//!
//! stdout and stderr are drained concurrently with the wait so a chatty
//! backend can never deadlock on a full pipe.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

// ---------------------------------------------------------------------------
// Invocation / ExecOutput
// ---------------------------------------------------------------------------

/// One backend invocation request.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Full argument vector.
    pub args: Vec<String>,
    /// Text piped to the child's stdin; `None` closes stdin immediately.
    pub stdin: Option<String>,
    /// Wall-clock budget for the whole run.
    pub timeout: Duration,
}

/// Collected result of a completed (non-timed-out) invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code; `None` when the process died from a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl ExecOutput {
    /// `true` for a clean zero exit.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// ExecError
// ---------------------------------------------------------------------------

/// Errors from the runner itself (the adapters layer their own
/// classification on top of non-zero exits).
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be started at all.
    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while feeding stdin or waiting on the child.
    #[error("subprocess I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The process exceeded its wall-clock budget.  The process group has
    /// been killed before this error is returned.
    #[error("{program} exceeded its {timeout:?} timeout and was killed")]
    Timeout { program: String, timeout: Duration },
}

// ---------------------------------------------------------------------------
// ProcessRunner
// ---------------------------------------------------------------------------

/// Stateless subprocess executor shared by both adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `inv` to completion or timeout.
    ///
    /// On timeout the child's process group is killed and reaped before
    /// [`ExecError::Timeout`] is returned — no process is left running.
    pub async fn run(&self, inv: &Invocation) -> Result<ExecOutput, ExecError> {
        let program = inv.program.display().to_string();
        log::debug!(
            "exec: spawning {} {:?} (timeout {:?})",
            program,
            inv.args,
            inv.timeout
        );

        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args)
            .stdin(if inv.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout kill reaches forked workers too.
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain stdout/stderr concurrently with the wait; writing stdin also
        // happens on its own task so a non-reading child cannot wedge us.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), inv.stdin.clone()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    log::debug!("exec: stdin write failed: {e}");
                }
                // pipe drops here, closing the child's stdin
            });
        }

        let status = match tokio::time::timeout(inv.timeout, child.wait()).await {
            Ok(waited) => waited?,
            Err(_) => {
                kill_group(&mut child);
                // Reap so nothing is left behind before we surface the error.
                let _ = child.wait().await;
                log::warn!(
                    "exec: {} timed out after {:?}, process group killed",
                    program,
                    inv.timeout
                );
                return Err(ExecError::Timeout {
                    program,
                    timeout: inv.timeout,
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let elapsed = started.elapsed();

        log::debug!(
            "exec: {} exited with {:?} in {:?} ({} bytes stdout, {} bytes stderr)",
            program,
            status.code(),
            elapsed,
            stdout.len(),
            stderr.len()
        );

        Ok(ExecOutput {
            code: status.code(),
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Spawn a task reading a stdio pipe to the end, lossy-decoded.
fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Kill the child's whole process group (unix) or the child itself.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child was spawned with process_group(0), so its pgid == pid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
        return;
    }

    if let Err(e) = child.start_kill() {
        log::warn!("exec: kill failed: {e}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

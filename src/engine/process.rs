//! Bounded subprocess execution for external engines

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// How long to wait for pipes to close after a killed engine
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A fully-specified engine invocation
#[derive(Debug, Clone)]
pub struct EngineCommand {
    /// Human-readable engine name used in errors and logs
    pub engine: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
    /// Captured output kept for diagnostics
    pub max_diagnostic_bytes: usize,
}

/// Output of an engine run that exited successfully
#[derive(Debug)]
pub struct EngineOutput {
    pub status: ExitStatus,
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// Drain a child pipe in the background so the child never blocks on a full pipe.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Keep the tail of the captured output; engines print the actual error last.
fn truncate_diagnostics(mut bytes: Vec<u8>, max: usize) -> String {
    if bytes.len() > max {
        bytes.drain(..bytes.len() - max);
    }
    String::from_utf8_lossy(&bytes).trim().to_string()
}

async fn collect(
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
    max: usize,
) -> String {
    let mut combined = stderr.await.unwrap_or_default();
    let out = stdout.await.unwrap_or_default();
    if !out.is_empty() {
        if !combined.is_empty() {
            combined.push(b'\n');
        }
        combined.extend_from_slice(&out);
    }
    truncate_diagnostics(combined, max)
}

/// SIGKILL every process in the engine's group. The group id is the child's pid.
#[cfg(unix)]
fn kill_process_group(engine: &str, child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == -1 {
        let e = std::io::Error::last_os_error();
        tracing::warn!(engine, error = %e, "Failed to kill engine process group");
    }
}

/// Run an engine to completion, failure, or timeout.
///
/// The child gets no stdin so it can never prompt. On timeout it is killed
/// together with its process group (unix) and reaped before this returns.
pub async fn run_engine(command: &EngineCommand) -> Result<EngineOutput> {
    let started = Instant::now();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches anything the engine forked
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::EngineSpawn {
            engine: command.engine.to_string(),
            source: e,
        })?;

    tracing::debug!(
        engine = command.engine,
        pid = child.id(),
        program = %command.program.display(),
        "Engine started"
    );

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match tokio::time::timeout(command.timeout, child.wait()).await {
        Ok(status) => {
            let status = status?;
            let diagnostics = collect(stdout, stderr, command.max_diagnostic_bytes).await;
            let elapsed = started.elapsed();

            if !status.success() {
                tracing::warn!(
                    engine = command.engine,
                    %status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Engine exited unsuccessfully"
                );
                return Err(Error::EngineFailed {
                    engine: command.engine.to_string(),
                    status: status.to_string(),
                    diagnostics,
                });
            }

            tracing::debug!(
                engine = command.engine,
                elapsed_ms = elapsed.as_millis() as u64,
                "Engine finished"
            );
            Ok(EngineOutput {
                status,
                diagnostics,
                elapsed,
            })
        }
        Err(_) => {
            #[cfg(unix)]
            kill_process_group(command.engine, &child);
            if let Err(e) = child.kill().await {
                tracing::warn!(engine = command.engine, error = %e, "Failed to kill engine");
            }
            // Bounded in case a descendant left the group and still holds a pipe
            let diagnostics = tokio::time::timeout(
                DRAIN_GRACE,
                collect(stdout, stderr, command.max_diagnostic_bytes),
            )
            .await
            .unwrap_or_default();
            tracing::warn!(
                engine = command.engine,
                timeout_ms = command.timeout.as_millis() as u64,
                "Engine timed out and was killed"
            );
            Err(Error::EngineTimeout {
                engine: command.engine.to_string(),
                timeout: command.timeout,
                diagnostics,
            })
        }
    }
}

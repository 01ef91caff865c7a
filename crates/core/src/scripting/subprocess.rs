//! Spawn-and-capture helper for the script runner.
//!
//! [`run_command`] takes a fully configured [`tokio::process::Command`],
//! captures both output streams in background tasks, and enforces the
//! deadline over the whole run: the wait for exit and the reads of both
//! pipes. A descendant that keeps a pipe open therefore cannot stretch a
//! run past its deadline. On Unix the child leads its own process group,
//! which is killed as a whole when the deadline wins.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::error::ScriptError;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated to prevent memory exhaustion
/// from extremely verbose scripts.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Spawn `cmd`, capture stdout/stderr, and kill it if `timeout` elapses.
pub async fn run_command(
    cmd: &mut Command,
    timeout: Duration,
) -> Result<CapturedOutput, ScriptError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => ScriptError::NotFound(program.clone()),
        ErrorKind::PermissionDenied => ScriptError::PermissionDenied(program.clone()),
        _ => ScriptError::Io(e),
    })?;
    #[cfg(unix)]
    let pid = child.id();

    // Read in spawned tasks so `child.wait()` can borrow `&mut child`.
    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let collected = tokio::time::timeout(timeout, async {
        let status = child.wait().await?;
        let stdout_bytes = (&mut stdout_task).await.unwrap_or_default();
        let stderr_bytes = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout_bytes, stderr_bytes))
    })
    .await;

    match collected {
        Ok(Ok((status, stdout_bytes, stderr_bytes))) => Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(ScriptError::Io(e)),
        Err(_elapsed) => {
            // The child may already have exited while a descendant still
            // holds the pipes, so kill the group before dropping the handle.
            #[cfg(unix)]
            if let Some(pid) = pid {
                if let Err(e) = crate::reaper::force_kill_group(pid) {
                    tracing::debug!(pid, error = %e, "Group kill after timeout failed");
                }
            }
            drop(child);
            stdout_task.abort();
            stderr_task.abort();
            Err(ScriptError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

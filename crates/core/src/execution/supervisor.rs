//! Launch, stream, time out, and collect a single child process.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::command::{CommandSpec, ExecError};
use super::output::clean_output;
use crate::reaper;

/// How long draining may continue after the child has exited.
///
/// Descendants that inherited the pipes can keep them open indefinitely;
/// once this elapses the drain is cancelled and partial output returned.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Extra time granted to the watchdog's kill before the supervisor kills
/// the child handle itself.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Buffered lines per stream between a pipe reader and the drain loop.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Final state of a supervised process.
#[derive(Debug, Clone, Serialize)]
pub struct ExecStatus {
    /// OS process id (`None` only if the child was reaped before it
    /// could be read).
    pub pid: Option<u32>,
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal on Unix.
    pub signal: Option<i32>,
    /// The process exited on its own with an exit code.
    pub complete: bool,
    /// The deadline elapsed and a kill was issued.
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub runtime_ms: u64,
}

/// Status plus cleaned output of one [`execute`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Exited on its own, in time, with code 0.
    pub fn is_success(&self) -> bool {
        self.status.complete && !self.status.timed_out && self.status.exit_code == Some(0)
    }
}

/// Run `spec` to completion or until its deadline, whichever comes first.
///
/// Output is drained concurrently while the child runs. Non-zero exits
/// and timeouts are reported in [`ExecStatus`]; only an invalid spec or a
/// failed launch is an error.
pub async fn execute(spec: CommandSpec) -> Result<ExecutionResult, ExecError> {
    spec.validate()?;

    let program = spec.program();
    tracing::debug!(
        program = %program,
        args = ?spec.argv(),
        mode = ?spec.mode,
        detached = spec.detached,
        timeout_ms = spec.timeout.as_millis() as u64,
        "Launching command",
    );

    let started_at = Utc::now();
    let start = Instant::now();

    let mut child = spec
        .build_command()
        .spawn()
        .map_err(|source| ExecError::Launch {
            program: program.clone(),
            source,
        })?;
    let pid = child.id();

    let (stdout_tx, stdout_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let readers = [
        tokio::spawn(forward_lines(child.stdout.take(), stdout_tx)),
        tokio::spawn(forward_lines(child.stderr.take(), stderr_tx)),
    ];

    let cancel = CancellationToken::new();
    let mut drain = tokio::spawn(drain_streams(stdout_rx, stderr_rx, cancel.clone()));

    let (done_tx, done_rx) = oneshot::channel();
    let watchdog = tokio::spawn(watch_deadline(pid, spec.timeout, spec.detached, done_rx));

    let wait_result = match tokio::time::timeout(spec.timeout + KILL_GRACE, child.wait()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?pid, "Process survived watchdog kill, killing handle");
            let _ = child.start_kill();
            child.wait().await
        }
    };
    // Fails only when the watchdog already fired.
    let _ = done_tx.send(());
    let timed_out = watchdog.await.unwrap_or(false);

    let (stdout, stderr) = match tokio::time::timeout(DRAIN_GRACE, &mut drain).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            tracing::debug!(?pid, "Output pipes still open after exit, abandoning drain");
            cancel.cancel();
            drain.await.unwrap_or_default()
        }
    };
    for reader in readers {
        reader.abort();
    }

    let runtime_ms = start.elapsed().as_millis() as u64;
    let status = match wait_result {
        Ok(exit) => ExecStatus {
            pid,
            exit_code: exit.code(),
            signal: exit_signal(&exit),
            complete: exit.code().is_some(),
            timed_out,
            started_at,
            runtime_ms,
        },
        Err(e) => {
            tracing::warn!(?pid, error = %e, "Failed to collect exit status");
            ExecStatus {
                pid,
                exit_code: None,
                signal: None,
                complete: false,
                timed_out,
                started_at,
                runtime_ms,
            }
        }
    };

    let result = ExecutionResult {
        status,
        stdout,
        stderr,
    };
    tracing::debug!(
        ?pid,
        exit_code = ?result.status.exit_code,
        timed_out,
        runtime_ms,
        "Command finished",
    );
    Ok(result)
}

/// Read `stream` line by line and forward each line (without its `\n`)
/// until EOF or until the receiver goes away.
async fn forward_lines<R>(stream: Option<R>, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.strip_suffix('\n').unwrap_or(text.as_ref());
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        }
    }
}

/// Merge both line channels into two buffers until both close or `cancel`
/// fires, then return the cleaned `(stdout, stderr)` pair.
async fn drain_streams(
    mut stdout_rx: mpsc::Receiver<String>,
    mut stderr_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> (String, String) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_rx.recv(), if stdout_open => match line {
                Some(line) => {
                    tracing::debug!(stream = "stdout", "{line}");
                    append_line(&mut stdout, &line);
                }
                None => stdout_open = false,
            },
            line = stderr_rx.recv(), if stderr_open => match line {
                Some(line) => {
                    tracing::debug!(stream = "stderr", "{line}");
                    append_line(&mut stderr, &line);
                }
                None => stderr_open = false,
            },
            _ = cancel.cancelled() => break,
        }
    }

    // Keep whatever was already queued when the drain was cut short.
    while let Ok(line) = stdout_rx.try_recv() {
        append_line(&mut stdout, &line);
    }
    while let Ok(line) = stderr_rx.try_recv() {
        append_line(&mut stderr, &line);
    }

    (clean_output(&stdout), clean_output(&stderr))
}

fn append_line(buf: &mut String, line: &str) {
    if buf.len() + line.len() < MAX_OUTPUT_BYTES {
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Race the deadline against completion. Returns `true` if the deadline
/// won and a kill was issued.
async fn watch_deadline(
    pid: Option<u32>,
    timeout: Duration,
    detached: bool,
    done: oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        _ = done => false,
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(
                ?pid,
                timeout_ms = timeout.as_millis() as u64,
                "Command timed out, killing process",
            );
            if let Some(pid) = pid {
                let killed = if detached {
                    reaper::force_kill_group(pid)
                } else {
                    reaper::force_kill(pid)
                };
                if let Err(e) = killed {
                    tracing::debug!(pid, error = %e, "Kill after timeout failed");
                }
            }
            true
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

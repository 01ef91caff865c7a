//! Forced termination of processes by pid or by name pattern.
//!
//! [`ProcessReaper`] works against a [`ProcessTable`], a snapshot-and-kill
//! seam over the OS. [`SystemProcessTable`] enumerates with `sysinfo` and
//! kills with `SIGKILL` on Unix. Only processes are listed; threads,
//! which Linux exposes alongside them, are filtered out. Snapshots are never synchronized with
//! the live table, so a process exiting between enumeration and kill is
//! an expected race rather than a failure.

use sysinfo::System;

/// Errors from enumerating or killing processes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaperError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    #[error("permission denied killing process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    #[error("failed to enumerate processes: {0}")]
    Enumeration(String),
}

/// One row of a process table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }

    /// Case-insensitive substring match of `pattern` against the name.
    pub fn matches(&self, pattern: &str) -> bool {
        self.name
            .to_lowercase()
            .contains(&pattern.to_lowercase())
    }
}

/// Source of process snapshots and the kill primitive applied to them.
pub trait ProcessTable: Send + Sync {
    /// Read the current process table.
    fn snapshot(&self) -> Result<Vec<ProcessRecord>, ReaperError>;

    /// Force-terminate `pid`.
    fn kill(&self, pid: u32) -> Result<(), ReaperError>;
}

/// The host's live process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessRecord>, ReaperError> {
        let mut system = System::new();
        system.refresh_processes();

        // On Linux every thread also appears with its own id and name.
        let records: Vec<ProcessRecord> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| ProcessRecord::new(pid.as_u32(), process.name()))
            .collect();

        // A readable table always contains at least the caller.
        if records.is_empty() {
            return Err(ReaperError::Enumeration(
                "process table is empty or unreadable".to_string(),
            ));
        }
        Ok(records)
    }

    fn kill(&self, pid: u32) -> Result<(), ReaperError> {
        force_kill(pid)
    }
}

/// Kills processes through a [`ProcessTable`].
#[derive(Debug, Default, Clone)]
pub struct ProcessReaper<T = SystemProcessTable> {
    table: T,
}

impl ProcessReaper<SystemProcessTable> {
    pub fn new() -> Self {
        Self::with_table(SystemProcessTable)
    }
}

impl<T: ProcessTable> ProcessReaper<T> {
    pub fn with_table(table: T) -> Self {
        Self { table }
    }

    /// Terminate exactly one process.
    pub fn kill_by_id(&self, pid: u32) -> Result<(), ReaperError> {
        tracing::info!(pid, "Killing process");
        self.table.kill(pid)
    }

    /// Kill every process whose name contains `pattern` (case-insensitive).
    ///
    /// Best effort: a failed kill never stops the sweep, processes that
    /// vanished before the kill are ignored, and other failures are
    /// returned. If the table cannot be read at all the sweep is skipped
    /// with a warning; use [`try_kill_by_name_pattern`](Self::try_kill_by_name_pattern)
    /// to observe that case.
    pub fn kill_by_name_pattern(&self, pattern: &str) -> Vec<ReaperError> {
        match self.try_kill_by_name_pattern(pattern) {
            Ok(failures) => failures,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Skipping process sweep");
                Vec::new()
            }
        }
    }

    /// Like [`kill_by_name_pattern`](Self::kill_by_name_pattern) but
    /// surfaces an enumeration failure instead of treating it as zero
    /// matches.
    pub fn try_kill_by_name_pattern(&self, pattern: &str) -> Result<Vec<ReaperError>, ReaperError> {
        let own_pid = std::process::id();
        let targets: Vec<u32> = self
            .table
            .snapshot()?
            .into_iter()
            .filter(|record| record.pid != own_pid && record.matches(pattern))
            .map(|record| record.pid)
            .collect();

        tracing::debug!(pattern, matches = targets.len(), "Process sweep");

        let mut failures = Vec::new();
        for pid in targets {
            tracing::info!(pid, pattern, "Killing matching process");
            match self.table.kill(pid) {
                Ok(()) | Err(ReaperError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Kill failed, continuing sweep");
                    failures.push(e);
                }
            }
        }
        Ok(failures)
    }
}

// ---------------------------------------------------------------------------
// Kill primitives
// ---------------------------------------------------------------------------

/// Force kill a process (`SIGKILL` on Unix).
#[cfg(unix)]
pub fn force_kill(pid: u32) -> Result<(), ReaperError> {
    let target = checked_pid(pid)?;
    send_sigkill(target, pid)
}

/// Force kill every member of the process group led by `pgid`.
#[cfg(unix)]
pub fn force_kill_group(pgid: u32) -> Result<(), ReaperError> {
    let target = checked_pid(pgid)?;
    send_sigkill(-target, pgid)
}

/// Pids that would make `kill(2)` address a group or every process are
/// never valid targets.
#[cfg(unix)]
fn checked_pid(pid: u32) -> Result<libc::pid_t, ReaperError> {
    match libc::pid_t::try_from(pid) {
        Ok(target) if target > 0 => Ok(target),
        _ => Err(ReaperError::NotFound { pid }),
    }
}

#[cfg(unix)]
fn send_sigkill(target: libc::pid_t, pid: u32) -> Result<(), ReaperError> {
    // Safety: kill(2) has no memory-safety preconditions.
    let ret = unsafe { libc::kill(target, libc::SIGKILL) };
    if ret == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    Err(match err.raw_os_error() {
        Some(libc::ESRCH) => ReaperError::NotFound { pid },
        Some(libc::EPERM) => ReaperError::PermissionDenied { pid },
        _ => ReaperError::KillFailed {
            pid,
            reason: err.to_string(),
        },
    })
}

/// Force kill a process through the OS process API.
#[cfg(not(unix))]
pub fn force_kill(pid: u32) -> Result<(), ReaperError> {
    use sysinfo::Pid;

    let target = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(target) {
        return Err(ReaperError::NotFound { pid });
    }
    match system.process(target) {
        Some(process) if process.kill() => Ok(()),
        Some(_) => Err(ReaperError::KillFailed {
            pid,
            reason: "TerminateProcess failed".to_string(),
        }),
        None => Err(ReaperError::NotFound { pid }),
    }
}

/// Without Unix process groups only the leader itself is killed.
#[cfg(not(unix))]
pub fn force_kill_group(pgid: u32) -> Result<(), ReaperError> {
    force_kill(pgid)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

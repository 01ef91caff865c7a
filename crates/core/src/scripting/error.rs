//! Script runner error type.

/// Errors that can occur while running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A zero-second deadline was requested.
    #[error("Script timeout must be greater than zero")]
    InvalidTimeout,

    /// The interpreter binary was not found.
    #[error("Interpreter not found: {0}")]
    NotFound(String),

    /// The interpreter exists but could not be executed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The script exceeded its deadline and was killed.
    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The script exited with a non-zero exit code.
    #[error("Script failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    /// The script exited cleanly but wrote to stderr.
    #[error("Script execution produced error output")]
    ErrorOutput { stderr: String },

    /// Writing the script or talking to the process failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Output text that accompanies the failure: the stderr of an
    /// [`ErrorOutput`](Self::ErrorOutput) run, empty otherwise.
    pub fn output(&self) -> &str {
        match self {
            Self::ErrorOutput { stderr } => stderr,
            _ => "",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

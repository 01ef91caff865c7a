//! Command specification and argument construction.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Shell used for [`ExecMode::Shell`] when the caller does not override it.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Per-call timeout used when the caller does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Windows `CREATE_NEW_PROCESS_GROUP` creation flag.
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Errors that prevent a command from running at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// How the argument vector for the child is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// `shell` is the program, `args` are passed verbatim.
    Script,
    /// `shell` is the binary, `command` is passed as one opaque argument.
    Executable,
    /// `shell -c command`.
    #[default]
    Shell,
}

impl ExecMode {
    /// Resolve the legacy flag pair. Script wins over executable, which
    /// wins over plain shell interpolation.
    pub fn from_flags(is_script: bool, is_executable: bool) -> Self {
        if is_script {
            Self::Script
        } else if is_executable {
            Self::Executable
        } else {
            Self::Shell
        }
    }
}

/// A single command invocation handed to [`execute`](super::execute).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell path, or the program itself in script/executable modes.
    pub shell: PathBuf,
    /// Raw command text (shell and executable modes).
    pub command: String,
    /// Argument list (script mode).
    pub args: Vec<String>,
    /// Deadline after which the child is force-killed. Must be non-zero.
    pub timeout: Duration,
    pub mode: ExecMode,
    /// Launch the child in its own process group.
    pub detached: bool,
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            command: String::new(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            mode: ExecMode::Shell,
            detached: false,
        }
    }
}

impl CommandSpec {
    /// `DEFAULT_SHELL -c command`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Run `program` directly with `args`, typically a script path or an
    /// interpreter followed by the script path.
    pub fn script(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            shell: program.into(),
            args,
            mode: ExecMode::Script,
            ..Self::default()
        }
    }

    /// Run `binary` with `command` as its single argument string.
    pub fn executable(binary: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            shell: binary.into(),
            command: command.into(),
            mode: ExecMode::Executable,
            ..Self::default()
        }
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Reject specs that cannot be supervised.
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.timeout.is_zero() {
            return Err(ExecError::InvalidTimeout);
        }
        Ok(())
    }

    /// Human-readable program name for logs and errors.
    pub fn program(&self) -> String {
        self.shell.to_string_lossy().into_owned()
    }

    /// The argument vector passed after the program.
    pub fn argv(&self) -> Vec<String> {
        match self.mode {
            ExecMode::Script => self.args.clone(),
            ExecMode::Executable => vec![self.command.clone()],
            ExecMode::Shell => vec!["-c".to_string(), self.command.clone()],
        }
    }

    /// Build the child command with piped output and a null stdin.
    pub(crate) fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.args(self.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.detached {
            // The child leads its own group, so a group kill reaches its
            // descendants and signals aimed at our group do not reach it.
            #[cfg(unix)]
            cmd.process_group(0);
            #[cfg(windows)]
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        cmd
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Run source code through an interpreter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::ephemeral::EphemeralScript;
use super::error::ScriptError;
use super::subprocess;

/// Interpreter used when none is configured.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Extension given to materialized scripts when none is configured.
pub const DEFAULT_SCRIPT_EXTENSION: &str = ".py";

/// Executes source strings with one interpreter binary.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: PathBuf,
    extension: String,
    /// Parent of the per-call temp directories; system temp dir if `None`.
    temp_root: Option<PathBuf>,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            temp_root: None,
        }
    }

    /// File extension (including the dot) for materialized scripts.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Create per-call directories under `root` instead of the system
    /// temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Write `source` to a fresh temp file and run
    /// `interpreter <file> <args...>` with a deadline of `timeout_secs`.
    ///
    /// Returns stdout when the script exits 0 with empty stderr. A clean
    /// exit with any stderr output is [`ScriptError::ErrorOutput`], which
    /// carries the stderr text. The temp directory is gone by the time
    /// this returns, on every path.
    pub async fn run_script(
        &self,
        source: &str,
        timeout_secs: u64,
        args: &[String],
    ) -> Result<String, ScriptError> {
        if timeout_secs == 0 {
            return Err(ScriptError::InvalidTimeout);
        }

        let mut script =
            EphemeralScript::create(self.temp_root.as_deref(), &self.extension, source)
                .inspect_err(|e| tracing::debug!(error = %e, "Failed to write script"))?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script.path()).args(args);
        tracing::debug!(
            interpreter = %self.interpreter.display(),
            script = %script.path().display(),
            ?args,
            "Running script",
        );

        let result = subprocess::run_command(&mut cmd, Duration::from_secs(timeout_secs)).await;

        if let Err(e) = script.cleanup() {
            tracing::debug!(dir = %script.dir().display(), error = %e, "Failed to remove script directory");
        }

        let output = result.inspect_err(|e| tracing::debug!(error = %e, "Script run failed"))?;

        if output.exit_code != 0 {
            tracing::debug!(exit_code = output.exit_code, stderr = %output.stderr, "Script exited non-zero");
            return Err(ScriptError::ExecutionFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        if !output.stderr.is_empty() {
            tracing::debug!(stderr = %output.stderr, "Script wrote to stderr");
            return Err(ScriptError::ErrorOutput {
                stderr: output.stderr,
            });
        }

        Ok(output.stdout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    /// Runner using `/bin/sh` so tests do not depend on Python.
    fn sh_runner(root: &Path) -> ScriptRunner {
        ScriptRunner::new("/bin/sh")
            .with_extension(".sh")
            .with_temp_root(root)
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).expect("read root").count()
    }

    #[tokio::test]
    async fn clean_run_returns_stdout() {
        let root = tempfile::tempdir().expect("root");
        let output = sh_runner(root.path())
            .run_script("printf ok", 5, &[])
            .await
            .expect("run");

        assert_eq!(output, "ok");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn stderr_on_zero_exit_is_a_failure() {
        let root = tempfile::tempdir().expect("root");
        let err = sh_runner(root.path())
            .run_script("echo partial; echo warning >&2; exit 0", 5, &[])
            .await
            .expect_err("stderr should fail the run");

        assert_matches!(err, ScriptError::ErrorOutput { .. });
        assert_eq!(err.output(), "warning\n");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_execution_failed() {
        let root = tempfile::tempdir().expect("root");
        let err = sh_runner(root.path())
            .run_script("exit 4", 5, &[])
            .await
            .expect_err("non-zero exit");

        assert_matches!(err, ScriptError::ExecutionFailed { exit_code: 4, .. });
    }

    #[tokio::test]
    async fn timeout_cleans_up_and_returns_empty() {
        let root = tempfile::tempdir().expect("root");
        let err = sh_runner(root.path())
            .run_script("sleep 30", 1, &[])
            .await
            .expect_err("deadline should fire");

        assert!(err.is_timeout());
        assert_eq!(err.output(), "");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn args_follow_the_script_path() {
        let root = tempfile::tempdir().expect("root");
        let args = vec!["first".to_string(), "second arg".to_string()];
        let output = sh_runner(root.path())
            .run_script("for a in \"$@\"; do echo \"$a\"; done", 5, &args)
            .await
            .expect("run");

        assert_eq!(output, "first\nsecond arg\n");
    }

    #[tokio::test]
    async fn missing_interpreter_launches_nothing() {
        let root = tempfile::tempdir().expect("root");
        let runner = ScriptRunner::new("/nonexistent/python").with_temp_root(root.path());
        let err = runner
            .run_script("print('ok')", 5, &[])
            .await
            .expect_err("missing interpreter");

        assert_matches!(err, ScriptError::NotFound(_));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn unwritable_root_fails_before_launch() {
        let root = tempfile::tempdir().expect("root");
        let runner = sh_runner(&root.path().join("missing"));
        let err = runner
            .run_script("printf ok", 5, &[])
            .await
            .expect_err("write should fail");

        assert_matches!(err, ScriptError::Io(_));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let root = tempfile::tempdir().expect("root");
        let err = sh_runner(root.path())
            .run_script("printf ok", 0, &[])
            .await
            .expect_err("zero timeout");

        assert_matches!(err, ScriptError::InvalidTimeout);
    }

    #[test]
    fn defaults() {
        let runner = ScriptRunner::default();
        assert_eq!(runner.interpreter(), Path::new("python3"));
    }
}

//! Agent configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use hostexec_core::execution::{CommandSpec, DEFAULT_SHELL, DEFAULT_TIMEOUT};
use hostexec_core::scripting::{ScriptRunner, DEFAULT_INTERPRETER};

/// Default interval between CPU load samples.
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;

/// A variable was set to something unusable.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Runtime configuration for the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Shell for plain commands.
    pub shell: PathBuf,
    /// Interpreter for scripts and the CPU sampling script.
    pub python_bin: PathBuf,
    /// Per-call timeout used when a caller does not supply one.
    pub default_timeout: Duration,
    /// Time between CPU load samples.
    pub metrics_interval: Duration,
    /// Name pattern of a process family to kill once at startup.
    pub reap_on_start: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            python_bin: PathBuf::from(DEFAULT_INTERPRETER),
            default_timeout: DEFAULT_TIMEOUT,
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
            reap_on_start: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                 | Default      |
    /// |-------------------------|--------------|
    /// | `HOSTEXEC_SHELL`        | `/bin/bash`  |
    /// | `HOSTEXEC_PYTHON`       | `python3`    |
    /// | `HOSTEXEC_TIMEOUT_SECS` | `30`         |
    /// | `METRICS_INTERVAL_SECS` | `60`         |
    /// | `REAP_ON_START`         | unset        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let shell = non_empty("HOSTEXEC_SHELL")
            .map(PathBuf::from)
            .unwrap_or(defaults.shell);

        let python_bin = non_empty("HOSTEXEC_PYTHON")
            .map(PathBuf::from)
            .unwrap_or(defaults.python_bin);

        let default_timeout = match non_empty("HOSTEXEC_TIMEOUT_SECS") {
            Some(value) => parse_secs("HOSTEXEC_TIMEOUT_SECS", value)?,
            None => defaults.default_timeout,
        };

        let metrics_interval = match non_empty("METRICS_INTERVAL_SECS") {
            Some(value) => parse_secs("METRICS_INTERVAL_SECS", value)?,
            None => defaults.metrics_interval,
        };

        let reap_on_start = non_empty("REAP_ON_START").map(|v| v.trim().to_string());

        Ok(Self {
            shell,
            python_bin,
            default_timeout,
            metrics_interval,
            reap_on_start,
        })
    }

    /// A shell-mode command using the configured shell and default timeout.
    pub fn command(&self, command: impl Into<String>) -> CommandSpec {
        CommandSpec::shell(command)
            .with_shell(&self.shell)
            .with_timeout(self.default_timeout)
    }

    /// A script runner using the configured interpreter.
    pub fn script_runner(&self) -> ScriptRunner {
        ScriptRunner::new(&self.python_bin)
    }
}

/// Parse a positive number of seconds.
fn parse_secs(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero",
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be a whole number of seconds",
        }),
    }
}

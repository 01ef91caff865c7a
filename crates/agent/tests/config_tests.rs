//! Integration tests for agent configuration loading.
//!
//! Uses [`AgentConfig::from_lookup`] with an in-memory map so tests never
//! touch the real process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;
use hostexec_agent::config::{AgentConfig, ConfigError};
use hostexec_core::execution::ExecMode;

fn load(vars: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AgentConfig::from_lookup(|var| map.get(var).cloned())
}

// ---------------------------------------------------------------------------
// Test: defaults
// ---------------------------------------------------------------------------

/// With nothing set, the agent uses bash, python3, a 30 second timeout and
/// a one minute sampling interval.
#[test]
fn empty_environment_uses_defaults() {
    let config = load(&[]).expect("defaults should load");

    assert_eq!(config, AgentConfig::default());
    assert_eq!(config.shell, PathBuf::from("/bin/bash"));
    assert_eq!(config.python_bin, PathBuf::from("python3"));
    assert_eq!(config.default_timeout, Duration::from_secs(30));
    assert_eq!(config.metrics_interval, Duration::from_secs(60));
    assert!(config.reap_on_start.is_none());
}

/// Blank values are treated as unset rather than as errors.
#[test]
fn blank_values_fall_back_to_defaults() {
    let config = load(&[("HOSTEXEC_TIMEOUT_SECS", "  "), ("REAP_ON_START", "")])
        .expect("blank values should load");

    assert_eq!(config.default_timeout, Duration::from_secs(30));
    assert!(config.reap_on_start.is_none());
}

// ---------------------------------------------------------------------------
// Test: overrides
// ---------------------------------------------------------------------------

/// Every variable overrides its default.
#[test]
fn overrides_are_applied() {
    let config = load(&[
        ("HOSTEXEC_SHELL", "/bin/sh"),
        ("HOSTEXEC_PYTHON", "/opt/py/bin/python"),
        ("HOSTEXEC_TIMEOUT_SECS", "120"),
        ("METRICS_INTERVAL_SECS", " 15 "),
        ("REAP_ON_START", " meshagent "),
    ])
    .expect("overrides should load");

    assert_eq!(config.shell, PathBuf::from("/bin/sh"));
    assert_eq!(config.python_bin, PathBuf::from("/opt/py/bin/python"));
    assert_eq!(config.default_timeout, Duration::from_secs(120));
    assert_eq!(config.metrics_interval, Duration::from_secs(15));
    assert_eq!(config.reap_on_start.as_deref(), Some("meshagent"));
}

/// Commands built from the config inherit its shell and default timeout.
#[test]
fn command_uses_configured_shell_and_timeout() {
    let config = load(&[("HOSTEXEC_SHELL", "/bin/sh"), ("HOSTEXEC_TIMEOUT_SECS", "5")])
        .expect("config");

    let spec = config.command("uptime");

    assert_eq!(spec.shell, PathBuf::from("/bin/sh"));
    assert_eq!(spec.timeout, Duration::from_secs(5));
    assert_eq!(spec.mode, ExecMode::Shell);
    assert_eq!(spec.argv(), vec!["-c", "uptime"]);
}

/// The script runner uses the configured interpreter.
#[test]
fn script_runner_uses_configured_interpreter() {
    let config = load(&[("HOSTEXEC_PYTHON", "/usr/local/bin/python3.12")]).expect("config");
    assert_eq!(
        config.script_runner().interpreter(),
        PathBuf::from("/usr/local/bin/python3.12").as_path()
    );
}

// ---------------------------------------------------------------------------
// Test: invalid values
// ---------------------------------------------------------------------------

/// Non-numeric timeouts are rejected with the offending variable named.
#[test]
fn non_numeric_timeout_is_rejected() {
    let err = load(&[("HOSTEXEC_TIMEOUT_SECS", "soon")]).expect_err("should fail");

    assert_matches!(
        err,
        ConfigError::Invalid { var: "HOSTEXEC_TIMEOUT_SECS", ref value, .. } if value == "soon"
    );
    assert!(err.to_string().contains("HOSTEXEC_TIMEOUT_SECS"));
}

/// A zero interval would spin the sampling loop and is rejected.
#[test]
fn zero_interval_is_rejected() {
    let err = load(&[("METRICS_INTERVAL_SECS", "0")]).expect_err("should fail");

    assert_matches!(
        err,
        ConfigError::Invalid {
            var: "METRICS_INTERVAL_SECS",
            reason: "must be greater than zero",
            ..
        }
    );
}

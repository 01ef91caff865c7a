//! `hostexec-agent` -- local execution daemon.
//!
//! Runs on managed hosts, optionally force-kills a stuck helper-process
//! family at startup, and samples CPU load on a fixed interval.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default     | Description                          |
//! |-------------------------|----------|-------------|--------------------------------------|
//! | `HOSTEXEC_SHELL`        | no       | `/bin/bash` | Shell for plain commands             |
//! | `HOSTEXEC_PYTHON`       | no       | `python3`   | Script interpreter                   |
//! | `HOSTEXEC_TIMEOUT_SECS` | no       | `30`        | Default per-command timeout          |
//! | `METRICS_INTERVAL_SECS` | no       | `60`        | Seconds between CPU load samples     |
//! | `REAP_ON_START`         | no       | --          | Process name pattern to kill at start |

use hostexec_agent::config::AgentConfig;
use hostexec_agent::daemon;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostexec_agent=info,hostexec_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        shell = %config.shell.display(),
        python = %config.python_bin.display(),
        default_timeout_secs = config.default_timeout.as_secs(),
        metrics_interval_secs = config.metrics_interval.as_secs(),
        reap_on_start = ?config.reap_on_start,
        "Starting hostexec-agent",
    );

    daemon::run(&config).await;
}

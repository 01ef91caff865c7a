//! Agent main loop.
//!
//! Optionally sweeps a stuck helper-process family at startup, then
//! samples CPU load on a fixed interval until shutdown is requested.

use std::future::Future;

use hostexec_core::reaper::ProcessReaper;
use hostexec_core::telemetry::CpuLoadSampler;

use crate::config::AgentConfig;

/// Run until Ctrl-C.
pub async fn run(config: &AgentConfig) {
    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await;
}

/// Run until `shutdown` resolves.
///
/// Shutdown is checked between samples; a sample in progress finishes
/// first.
pub async fn run_until<F>(config: &AgentConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    if let Some(pattern) = &config.reap_on_start {
        sweep(pattern);
    }

    let sampler = CpuLoadSampler::new(config.script_runner());
    let mut ticker = tokio::time::interval(config.metrics_interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping agent");
                break;
            }
            _ = ticker.tick() => {
                let cpu_percent = sampler.sample_cpu_load().await;
                tracing::info!(cpu_percent, "CPU load");
            }
        }
    }
}

/// Kill every process whose name contains `pattern`, logging failures.
///
/// Returns the number of processes that could not be killed.
pub fn sweep(pattern: &str) -> usize {
    tracing::info!(pattern, "Sweeping process family");
    let failures = ProcessReaper::new().kill_by_name_pattern(pattern);
    for failure in &failures {
        tracing::warn!(pattern, error = %failure, "Process survived sweep");
    }
    failures.len()
}

//! CPU load sampling with a scripted source and a native fallback.

use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::scripting::{ScriptError, ScriptRunner};

/// Window over which CPU utilization is averaged.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// Deadline for the scripted sample: the interval plus interpreter startup.
pub const SCRIPT_TIMEOUT_SECS: u64 = 13;

/// Printed by [`CPU_SAMPLE_SCRIPT`] when psutil is missing or fails.
pub const SCRIPT_FAILURE_SENTINEL: &str = "pyerror";

/// Prints the rounded system-wide CPU percentage with no newline.
pub const CPU_SAMPLE_SCRIPT: &str = r#"import psutil
try:
    print(int(round(psutil.cpu_percent(interval=10))), end='')
except:
    print("pyerror", end='')
"#;

/// Why a single source could not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("sampling script failed: {0}")]
    Script(#[from] ScriptError),

    #[error("sampling script reported failure")]
    Sentinel,

    #[error("unparseable CPU load: {0:?}")]
    Parse(String),

    #[error("native CPU sampling failed: {0}")]
    Native(String),
}

/// One way of measuring CPU load, as a whole percentage.
#[async_trait]
pub trait CpuLoadSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn sample(&self) -> Result<u32, SampleError>;
}

/// Parse script output into a percentage.
///
/// The sentinel, anything that is not a non-negative integer, and empty
/// output are all failures.
pub fn parse_load(output: &str) -> Result<u32, SampleError> {
    let trimmed = output.trim();
    if trimmed == SCRIPT_FAILURE_SENTINEL {
        return Err(SampleError::Sentinel);
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| SampleError::Parse(trimmed.to_string()))
}

/// Measures CPU load with a psutil script run through a [`ScriptRunner`].
#[derive(Debug, Clone)]
pub struct ScriptCpuSource {
    runner: ScriptRunner,
    source: String,
    timeout_secs: u64,
}

impl ScriptCpuSource {
    pub fn new(runner: ScriptRunner) -> Self {
        Self::with_source(runner, CPU_SAMPLE_SCRIPT, SCRIPT_TIMEOUT_SECS)
    }

    /// Use a different sampling script. Its stdout must be an integer or
    /// the failure sentinel.
    pub fn with_source(runner: ScriptRunner, source: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            runner,
            source: source.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl CpuLoadSource for ScriptCpuSource {
    fn name(&self) -> &str {
        "script"
    }

    async fn sample(&self) -> Result<u32, SampleError> {
        let output = self
            .runner
            .run_script(&self.source, self.timeout_secs, &[])
            .await?;
        parse_load(&output)
    }
}

/// Measures CPU load directly through `sysinfo`.
#[derive(Debug, Clone)]
pub struct NativeCpuSource {
    interval: Duration,
}

impl Default for NativeCpuSource {
    fn default() -> Self {
        Self::new(SAMPLE_INTERVAL)
    }
}

impl NativeCpuSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl CpuLoadSource for NativeCpuSource {
    fn name(&self) -> &str {
        "native"
    }

    async fn sample(&self) -> Result<u32, SampleError> {
        let mut system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
        tokio::time::sleep(self.interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        system.refresh_cpu();

        let usage = system.global_cpu_info().cpu_usage();
        if !usage.is_finite() {
            return Err(SampleError::Native(format!("invalid usage value {usage}")));
        }
        Ok(usage.round().clamp(0.0, 100.0) as u32)
    }
}

/// Tries each source in order and returns the first value obtained.
pub struct CpuLoadSampler {
    sources: Vec<Box<dyn CpuLoadSource>>,
}

impl CpuLoadSampler {
    /// The standard chain: psutil script first, `sysinfo` second.
    pub fn new(runner: ScriptRunner) -> Self {
        let script: Box<dyn CpuLoadSource> = Box::new(ScriptCpuSource::new(runner));
        let native: Box<dyn CpuLoadSource> = Box::new(NativeCpuSource::default());
        Self::with_sources(vec![script, native])
    }

    pub fn with_sources(sources: Vec<Box<dyn CpuLoadSource>>) -> Self {
        Self { sources }
    }

    /// Current CPU load percentage, or `0` when no source can measure it.
    pub async fn sample_cpu_load(&self) -> u32 {
        for source in &self.sources {
            match source.sample().await {
                Ok(percent) => {
                    tracing::debug!(source = source.name(), percent, "CPU load sampled");
                    return percent;
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "CPU load source failed");
                }
            }
        }
        tracing::debug!("No CPU load source succeeded, reporting 0");
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;

    /// Source with a canned answer that counts how often it was asked.
    struct Fixed {
        value: Option<u32>,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn boxed(value: Option<u32>) -> (Box<dyn CpuLoadSource>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                value,
                calls: Arc::clone(&calls),
            };
            (Box::new(source), calls)
        }
    }

    #[async_trait]
    impl CpuLoadSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn sample(&self) -> Result<u32, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value
                .ok_or_else(|| SampleError::Native("unavailable".to_string()))
        }
    }

    #[test]
    fn parse_accepts_integers() {
        assert_eq!(parse_load("42").expect("parse"), 42);
        assert_eq!(parse_load(" 7\n").expect("parse"), 7);
    }

    #[test]
    fn parse_rejects_sentinel_and_garbage() {
        assert_matches!(parse_load("pyerror"), Err(SampleError::Sentinel));
        assert_matches!(parse_load(""), Err(SampleError::Parse(_)));
        assert_matches!(parse_load("12.5"), Err(SampleError::Parse(_)));
        assert_matches!(parse_load("-3"), Err(SampleError::Parse(_)));
    }

    #[tokio::test]
    async fn preferred_source_wins_when_it_succeeds() {
        let (preferred, _) = Fixed::boxed(Some(12));
        let (fallback, fallback_calls) = Fixed::boxed(Some(99));
        let sampler = CpuLoadSampler::with_sources(vec![preferred, fallback]);

        assert_eq!(sampler.sample_cpu_load().await, 12);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_when_preferred_fails() {
        let (preferred, _) = Fixed::boxed(None);
        let (fallback, fallback_calls) = Fixed::boxed(Some(37));
        let sampler = CpuLoadSampler::with_sources(vec![preferred, fallback]);

        assert_eq!(sampler.sample_cpu_load().await, 37);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_yields_zero() {
        let (a, _) = Fixed::boxed(None);
        let (b, _) = Fixed::boxed(None);

        assert_eq!(CpuLoadSampler::with_sources(vec![a, b]).sample_cpu_load().await, 0);
        assert_eq!(CpuLoadSampler::with_sources(Vec::new()).sample_cpu_load().await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_sentinel_triggers_fallback() {
        let runner = ScriptRunner::new("/bin/sh").with_extension(".sh");
        let broken = ScriptCpuSource::with_source(runner, "printf pyerror", 5);
        assert_matches!(broken.sample().await, Err(SampleError::Sentinel));

        let broken: Box<dyn CpuLoadSource> = Box::new(broken);
        let (fallback, _) = Fixed::boxed(Some(55));
        let sampler = CpuLoadSampler::with_sources(vec![broken, fallback]);
        assert_eq!(sampler.sample_cpu_load().await, 55);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_output_is_parsed() {
        let runner = ScriptRunner::new("/bin/sh").with_extension(".sh");
        let source = ScriptCpuSource::with_source(runner, "printf 23", 5);
        assert_eq!(source.sample().await.expect("sample"), 23);
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_script_error() {
        let runner = ScriptRunner::new("/nonexistent/python3");
        let source = ScriptCpuSource::new(runner);
        assert_matches!(source.sample().await, Err(SampleError::Script(_)));
    }

    #[tokio::test]
    async fn native_source_reports_a_percentage() {
        let source = NativeCpuSource::new(Duration::from_millis(250));
        let percent = source.sample().await.expect("native sample");
        assert!(percent <= 100);
    }
}

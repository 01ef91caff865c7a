//! Best-effort host telemetry.
//!
//! Samplers here never fail: each one walks an ordered list of sources and
//! falls back to a neutral value when every source fails.

pub mod cpu;

pub use cpu::{
    parse_load, CpuLoadSampler, CpuLoadSource, NativeCpuSource, SampleError, ScriptCpuSource,
    CPU_SAMPLE_SCRIPT, SAMPLE_INTERVAL, SCRIPT_FAILURE_SENTINEL, SCRIPT_TIMEOUT_SECS,
};

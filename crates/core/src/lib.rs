//! `hostexec-core` -- local execution core of the monitoring agent.
//!
//! Everything here is pure process plumbing: no identity, transport, or
//! persistence. The agent binary and any dispatch layer build on the four
//! modules below.
//!
//! - [`execution`]: run a shell command, script, or executable under a
//!   deadline and capture its streamed output.
//! - [`scripting`]: materialize source code into an ephemeral file and run
//!   it through an interpreter.
//! - [`reaper`]: force-kill processes by pid or by name pattern.
//! - [`telemetry`]: best-effort CPU load sampling with fallback sources.

pub mod execution;
pub mod reaper;
pub mod scripting;
pub mod telemetry;

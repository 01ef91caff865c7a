//! Process supervisor.
//!
//! [`execute`] launches one child per [`CommandSpec`], drains its stdout
//! and stderr as they are produced, and force-kills it if the deadline
//! elapses first. Timeouts and non-zero exits are reported in
//! [`ExecStatus`] rather than as errors.

pub mod command;
pub mod output;
pub mod supervisor;

pub use command::{CommandSpec, ExecError, ExecMode, DEFAULT_SHELL, DEFAULT_TIMEOUT};
pub use output::clean_output;
pub use supervisor::{execute, ExecStatus, ExecutionResult};

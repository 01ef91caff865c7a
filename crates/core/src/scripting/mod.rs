//! Interpreted script execution.
//!
//! [`ScriptRunner`] writes source code into an [`EphemeralScript`], runs it
//! through an interpreter under a deadline, and classifies the outcome.
//! Any stderr output on an otherwise clean run counts as a failure, which
//! keeps garbled telemetry from being accepted as a measurement.

pub mod ephemeral;
pub mod error;
pub mod runner;
pub mod subprocess;

pub use ephemeral::EphemeralScript;
pub use error::ScriptError;
pub use runner::{ScriptRunner, DEFAULT_INTERPRETER, DEFAULT_SCRIPT_EXTENSION};

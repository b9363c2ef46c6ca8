//! External process execution shared by provisioning, target execution and
//! the coverage pipeline.
//!
//! Every external program the orchestrator touches (cargo, the container
//! runtime, coverage tools) goes through a [`CommandRunner`] so tests can
//! substitute a scripted double for real processes.

mod streaming;
mod types;

pub use streaming::StreamingCommandRunner;
pub use types::{CommandOutput, CommandRunner, Invocation, ProcessCommandRunner, ProcessError};

#[cfg(test)]
mod tests;

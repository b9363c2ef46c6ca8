//! Command runner that lets child output reach the terminal as it arrives.

use std::process::Stdio;

use super::types::{CommandOutput, CommandRunner, Invocation, ProcessError};

/// Runs commands with stdout and stderr inherited from this process.
///
/// Nothing is captured: the returned [`CommandOutput`] carries only the exit
/// code, so a long target never holds its log in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        let status = invocation
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| ProcessError::Spawn {
                program: invocation.program.clone(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn streams_output(&self) -> bool {
        true
    }
}

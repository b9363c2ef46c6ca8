//! Runs a single target command with its fully merged environment.
//!
//! The child inherits the parent environment. Target overrides are layered
//! on top, then any collector-supplied variables, and finally the resolved
//! `DATABASE_URL`, so a provisioned connection always wins.

use std::collections::BTreeMap;
use std::io::Write;

use shell_escape::unix::escape;

use crate::process::{CommandOutput, CommandRunner, Invocation, ProcessError};
use crate::target::{ConnectionDescriptor, TargetDescriptor};

/// Variable carrying the provisioned connection URL.
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Exit code reported when a child ends without one, for example when a
/// signal killed it.
pub const EXIT_CODE_WITHOUT_STATUS: i32 = 1;

const COMMENT_STYLE: &str = "\x1b[2m";
const COMMAND_STYLE: &str = "\x1b[93m";
const RESET_STYLE: &str = "\x1b[0m";

/// Environment overrides for one target in precedence order: target
/// overrides, then `extra`, then `DATABASE_URL` from `connection`.
#[must_use]
pub fn merged_overrides(
    target: &TargetDescriptor,
    extra: &BTreeMap<String, String>,
    connection: Option<&ConnectionDescriptor>,
) -> BTreeMap<String, String> {
    let mut merged = target.env_overrides.clone();
    merged.extend(
        extra
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    if let Some(connection) = connection {
        merged.insert(String::from(DATABASE_URL), connection.url.clone());
    }
    merged
}

/// Builds the invocation for `target`.
///
/// Test-harness targets receive `-- <forwarded> <harness args>` when either
/// list is non-empty; other kinds never see forwarded arguments.
///
/// # Errors
///
/// Returns [`ProcessError::EmptyCommand`] when the target has no program.
pub fn target_invocation(
    target: &TargetDescriptor,
    overrides: BTreeMap<String, String>,
    forwarded: &[String],
) -> Result<Invocation, ProcessError> {
    let (program, args) =
        target
            .command
            .split_first()
            .ok_or_else(|| ProcessError::EmptyCommand {
                tag: target.tag.clone(),
            })?;

    let mut invocation = Invocation::new(program.clone()).args(args.iter());
    if target.kind.runs_test_harness()
        && !(forwarded.is_empty() && target.harness_args.is_empty())
    {
        invocation = invocation
            .arg("--")
            .args(forwarded.iter())
            .args(target.harness_args.iter());
    }
    invocation.env = overrides;
    Ok(invocation)
}

/// Maps a finished command to the exit code the run should report.
#[must_use]
pub const fn exit_code(output: &CommandOutput) -> i32 {
    match output.code {
        Some(code) => code,
        None => EXIT_CODE_WITHOUT_STATUS,
    }
}

/// Renders overrides and argv the way a shell user would type them.
#[must_use]
pub fn render_command_line(invocation: &Invocation) -> String {
    let assignments = invocation
        .env
        .iter()
        .map(|(key, value)| format!("{key}={}", escape(value.as_str().into())));
    let words = invocation
        .argv()
        .into_iter()
        .map(|word| escape(word.into()).into_owned());
    assignments.chain(words).collect::<Vec<_>>().join(" ")
}

/// Executes target commands one at a time.
#[derive(Clone, Debug)]
pub struct Executor<R: CommandRunner> {
    runner: R,
    quiet: bool,
}

impl<R: CommandRunner> Executor<R> {
    /// Creates an executor. `quiet` suppresses the echoed command line.
    #[must_use]
    pub const fn new(runner: R, quiet: bool) -> Self {
        Self { runner, quiet }
    }

    /// Runs `target` and returns its exit code.
    ///
    /// Progress lines go to `out`. When the runner buffers output, captured
    /// stdout and stderr are replayed to `out` only if the command fails.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the command cannot be started.
    pub fn execute<W: Write>(
        &self,
        target: &TargetDescriptor,
        overrides: BTreeMap<String, String>,
        forwarded: &[String],
        out: &mut W,
    ) -> Result<i32, ProcessError> {
        let invocation = target_invocation(target, overrides, forwarded)?;

        writeln!(
            out,
            "{COMMENT_STYLE} # {} [{}]{RESET_STYLE}",
            target.comment, target.tag
        )
        .ok();
        if !self.quiet {
            writeln!(
                out,
                "{COMMAND_STYLE} $ {}{RESET_STYLE}",
                render_command_line(&invocation)
            )
            .ok();
        }

        let output = self.runner.run(&invocation)?;
        let code = exit_code(&output);
        if code != 0 && !self.runner.streams_output() {
            out.write_all(output.stdout.as_bytes()).ok();
            out.write_all(output.stderr.as_bytes()).ok();
        }
        if code != 0 {
            tracing::debug!(tag = %target.tag, code, "target failed");
        }
        Ok(code)
    }
}

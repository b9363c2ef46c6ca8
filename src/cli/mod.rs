//! Command-line interface definitions for the `gauntlet` binary.
//!
//! The parser lives here so the build script can render the manual page from
//! the same definition.

use clap::Parser;

/// Top-level CLI for the `gauntlet` binary.
#[derive(Debug, Parser)]
#[command(
    name = "gauntlet",
    version,
    about = "Run the runtime, TLS and database test matrix one target at a time",
    after_help = "Arguments after `--` are passed to the test harness of unit and integration targets."
)]
pub(crate) struct Cli {
    /// Select targets whose tag matches PATTERN. `_` separates literal
    /// segments that must appear in order; the first segment anchors at the
    /// start of the tag.
    #[arg(value_name = "PATTERN")]
    pub(crate) pattern: Option<String>,
    /// Print every target tag once and exit without running anything.
    #[arg(short = 'l', long)]
    pub(crate) list_targets: bool,
    /// Require PATTERN to equal the whole tag. Without PATTERN every target
    /// is still selected.
    #[arg(long)]
    pub(crate) exact: bool,
    /// Stream target output live instead of replaying it on failure.
    #[arg(short, long)]
    pub(crate) verbose: bool,
    /// Do not echo target command lines.
    #[arg(short, long)]
    pub(crate) quiet: bool,
    /// Collect source-based coverage from unit targets.
    #[arg(long)]
    pub(crate) coverage: bool,
    /// Arguments forwarded to test harnesses.
    #[arg(last = true, value_name = "HARNESS_ARGS")]
    pub(crate) forwarded: Vec<String>,
}

//! Source-based coverage for unit targets.
//!
//! Unit targets are told through `LLVM_PROFILE_FILE` to write one raw
//! profile per process into `<coverage_dir>/raw`. Once every target has
//! passed, [`CoverageCollector::collect`] merges the raw profiles, exports an
//! lcov report limited to first-party sources and renders it to HTML.
//!
//! Nothing here fails a run: missing tools, empty artifact sets and tool
//! failures all produce [`CoverageOutcome::Skipped`].

mod artifacts;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::config::GauntletConfig;
use crate::process::{CommandOutput, CommandRunner, Invocation};
use crate::target::TargetDescriptor;

pub use artifacts::{CoverageArtifacts, parse_test_objects};

const RAW_EXTENSION: &str = "profraw";
const IGNORED_SOURCES: [&str; 2] = ["/.cargo/registry", "/rustc/"];

/// Why the coverage pipeline did not produce a report.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CoverageSkip {
    /// No raw profiles were written.
    #[error("no raw profiles found in {dir}")]
    NoArtifacts {
        /// Directory that was searched.
        dir: Utf8PathBuf,
    },
    /// No instrumented test binaries were discovered.
    #[error("no test binaries were discovered")]
    NoObjects,
    /// A required external tool is not installed.
    #[error("{tool} is not installed")]
    MissingTool {
        /// Executable looked up on `PATH`.
        tool: String,
    },
    /// An external tool ran but did not succeed.
    #[error("{step} failed: {detail}")]
    ToolFailed {
        /// Pipeline step (`merge`, `export` or `render`).
        step: &'static str,
        /// Error text or captured stderr.
        detail: String,
    },
    /// The coverage directory could not be read or written.
    #[error("coverage directory {path}: {message}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// Result of [`CoverageCollector::collect`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoverageOutcome {
    /// An HTML report was rendered into `report`.
    Generated {
        /// Directory holding the rendered report.
        report: Utf8PathBuf,
    },
    /// The pipeline was skipped.
    Skipped(CoverageSkip),
}

/// Paths and tools used by the coverage pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoverageSettings {
    /// Cargo executable.
    pub cargo_bin: String,
    /// Optional toolchain selector such as `+nightly`.
    pub toolchain: Option<String>,
    /// Root of the coverage output.
    pub coverage_dir: Utf8PathBuf,
    /// Basename of the merged profile and lcov file.
    pub report_name: String,
    /// HTML renderer executable.
    pub genhtml_bin: String,
}

impl CoverageSettings {
    /// Reads settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &GauntletConfig) -> Self {
        Self {
            cargo_bin: config.cargo_bin.clone(),
            toolchain: config.toolchain.clone(),
            coverage_dir: Utf8PathBuf::from(&config.coverage_dir),
            report_name: config.library_name.clone(),
            genhtml_bin: config.genhtml_bin.clone(),
        }
    }

    /// Directory receiving raw per-process profiles.
    #[must_use]
    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.coverage_dir.join("raw")
    }

    fn profdata_path(&self) -> Utf8PathBuf {
        self.coverage_dir
            .join(format!("{}.profdata", self.report_name))
    }

    fn lcov_path(&self) -> Utf8PathBuf {
        self.coverage_dir.join(format!("{}.lcov", self.report_name))
    }
}

/// Decides whether an executable is available.
pub type ToolLookup = fn(&str) -> bool;

fn tool_on_path(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Prepares, accumulates and finally processes coverage artifacts.
#[derive(Clone, Debug)]
pub struct CoverageCollector<R: CommandRunner> {
    runner: R,
    settings: CoverageSettings,
    tool_available: ToolLookup,
}

impl<R: CommandRunner> CoverageCollector<R> {
    /// Creates a collector that looks tools up on `PATH`.
    #[must_use]
    pub fn new(runner: R, settings: CoverageSettings) -> Self {
        Self {
            runner,
            settings,
            tool_available: tool_on_path,
        }
    }

    /// Replaces the tool lookup.
    #[must_use]
    pub fn with_tool_lookup(mut self, lookup: ToolLookup) -> Self {
        self.tool_available = lookup;
        self
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &CoverageSettings {
        &self.settings
    }

    /// Empties the raw profile directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageSkip::Io`] when the directory cannot be reset.
    pub fn prepare(&self) -> Result<(), CoverageSkip> {
        let root = self.settings.coverage_dir.as_path();
        let io_error = |path: &Utf8Path, err: std::io::Error| CoverageSkip::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        Dir::create_ambient_dir_all(root, ambient_authority()).map_err(|err| io_error(root, err))?;
        let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(|err| io_error(root, err))?;
        let raw = self.settings.raw_dir();
        if dir.exists("raw") {
            dir.remove_dir_all("raw")
                .map_err(|err| io_error(raw.as_path(), err))?;
        }
        dir.create_dir("raw")
            .map_err(|err| io_error(raw.as_path(), err))?;
        Ok(())
    }

    /// Environment that makes a unit target emit collision-free raw
    /// profiles.
    #[must_use]
    pub fn profile_env(&self, tag: &str) -> BTreeMap<String, String> {
        let stem = tag.replace(':', "_");
        let pattern = self
            .settings
            .raw_dir()
            .join(format!("{stem}_%m_%p.{RAW_EXTENSION}"));
        BTreeMap::from([
            (String::from("LLVM_PROFILE_FILE"), pattern.into_string()),
            (String::from("RUSTFLAGS"), String::from("-C instrument-coverage")),
        ])
    }

    /// Rebuilds `target` without running it and records its test binaries.
    ///
    /// Failures are logged and leave `artifacts` unchanged.
    pub fn discover(
        &self,
        target: &TargetDescriptor,
        overrides: BTreeMap<String, String>,
        artifacts: &mut CoverageArtifacts,
    ) {
        let Some((program, args)) = target.command.split_first() else {
            return;
        };
        let mut invocation = Invocation::new(program.clone())
            .args(args.iter())
            .args(["--no-run", "--message-format=json"]);
        invocation.env = overrides;

        match self.runner.run(&invocation) {
            Ok(output) if output.is_success() => {
                let objects = parse_test_objects(&output.stdout);
                tracing::debug!(tag = %target.tag, count = objects.len(), "discovered test binaries");
                artifacts.record(objects);
            }
            Ok(output) => {
                tracing::warn!(tag = %target.tag, stderr = %output.stderr.trim(), "test binary discovery failed");
            }
            Err(err) => {
                tracing::warn!(tag = %target.tag, error = %err, "test binary discovery failed");
            }
        }
    }

    /// Merges, exports and renders everything gathered during the run.
    #[must_use]
    pub fn collect(&self, artifacts: &CoverageArtifacts) -> CoverageOutcome {
        match self.try_collect(artifacts) {
            Ok(report) => {
                tracing::info!(%report, "coverage report generated");
                CoverageOutcome::Generated { report }
            }
            Err(reason) => {
                tracing::warn!(%reason, "coverage skipped");
                CoverageOutcome::Skipped(reason)
            }
        }
    }

    fn try_collect(&self, artifacts: &CoverageArtifacts) -> Result<Utf8PathBuf, CoverageSkip> {
        let raws = self.raw_profiles()?;
        if raws.is_empty() {
            return Err(CoverageSkip::NoArtifacts {
                dir: self.settings.raw_dir(),
            });
        }
        if artifacts.is_empty() {
            return Err(CoverageSkip::NoObjects);
        }
        for tool in ["cargo-profdata", "cargo-cov", self.settings.genhtml_bin.as_str()] {
            if !(self.tool_available)(tool) {
                return Err(CoverageSkip::MissingTool {
                    tool: tool.to_owned(),
                });
            }
        }

        let profdata = self.settings.profdata_path();
        let merge = self
            .cargo("profdata")
            .args(["--", "merge", "--sparse", "-o", profdata.as_str()])
            .args(raws.iter().map(|raw| raw.as_str()));
        self.run_step("merge", &merge)?;

        let mut export = self
            .cargo("cov")
            .args(["--", "export", "--format=lcov", "-Xdemangler=rustfilt"]);
        for ignored in IGNORED_SOURCES {
            export = export.args(["--ignore-filename-regex", ignored]);
        }
        export = export
            .args(["--instr-profile", profdata.as_str()])
            .args(artifacts.object_args());
        let exported = self.run_step("export", &export)?;

        let lcov = self.settings.lcov_path();
        self.write_report(&lcov, &exported.stdout)?;

        let report = self.settings.coverage_dir.clone();
        let render = Invocation::new(self.settings.genhtml_bin.clone()).args([
            "-o",
            report.as_str(),
            lcov.as_str(),
        ]);
        self.run_step("render", &render)?;
        Ok(report)
    }

    fn cargo(&self, subcommand: &str) -> Invocation {
        Invocation::new(self.settings.cargo_bin.clone())
            .args(self.settings.toolchain.iter())
            .arg(subcommand)
    }

    fn run_step(
        &self,
        step: &'static str,
        invocation: &Invocation,
    ) -> Result<CommandOutput, CoverageSkip> {
        let output = self
            .runner
            .run(invocation)
            .map_err(|err| CoverageSkip::ToolFailed {
                step,
                detail: err.to_string(),
            })?;
        if !output.is_success() {
            return Err(CoverageSkip::ToolFailed {
                step,
                detail: output.stderr.trim().to_owned(),
            });
        }
        Ok(output)
    }

    fn raw_profiles(&self) -> Result<Vec<Utf8PathBuf>, CoverageSkip> {
        let raw_dir = self.settings.raw_dir();
        let io_error = |err: std::io::Error| CoverageSkip::Io {
            path: raw_dir.clone(),
            message: err.to_string(),
        };
        let Ok(dir) = Dir::open_ambient_dir(&raw_dir, ambient_authority()) else {
            return Ok(Vec::new());
        };
        let mut raws = Vec::new();
        for entry in dir.entries().map_err(io_error)? {
            let name = entry.map_err(io_error)?.file_name().map_err(io_error)?;
            if Utf8Path::new(&name).extension() == Some(RAW_EXTENSION) {
                raws.push(raw_dir.join(name));
            }
        }
        raws.sort();
        Ok(raws)
    }

    fn write_report(&self, path: &Utf8Path, contents: &str) -> Result<(), CoverageSkip> {
        let io_error = |err: std::io::Error| CoverageSkip::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let dir = Dir::open_ambient_dir(&self.settings.coverage_dir, ambient_authority())
            .map_err(io_error)?;
        let name = path.file_name().unwrap_or("coverage.lcov");
        dir.write(name, contents).map_err(io_error)
    }
}

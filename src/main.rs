//! Binary entry point for the Gauntlet CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gauntlet::{
    CommandRunner, ComposeRuntime, ConfigError, CoverageCollector, CoverageOutcome,
    CoverageSettings, Executor, GauntletConfig, MatrixSpec, ProcessCommandRunner,
    ProvisionSettings, Provisioner, Registry, RegistryError, RunError, RunOrchestrator,
    RunOutcome, RunWorkspace, Selection, StreamingCommandRunner,
};

mod cli;

use cli::Cli;

const LOG_FILTER_ENV: &str = "GAUNTLET_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid target matrix: {0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Run(#[from] RunError),
    #[error("cannot resolve the working directory: {0}")]
    WorkingDirectory(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> Result<i32, CliError> {
    let verbose = cli.verbose;
    let quiet = cli.quiet;
    let selection = selection_from(cli);

    let config = GauntletConfig::load_without_cli_args()?;
    let registry = Registry::build(&MatrixSpec::from_config(&config))?;
    let cwd = current_dir()?;

    let outcome = if verbose {
        execute(StreamingCommandRunner, quiet, &config, &cwd, &registry, &selection).await?
    } else {
        execute(ProcessCommandRunner, quiet, &config, &cwd, &registry, &selection).await?
    };

    report_outcome(io::stderr(), &outcome);
    Ok(outcome.exit_code())
}

fn selection_from(cli: Cli) -> Selection {
    Selection {
        pattern: cli.pattern,
        exact: cli.exact,
        list_only: cli.list_targets,
        forwarded: cli.forwarded,
        coverage: cli.coverage,
    }
}

async fn execute<R: CommandRunner>(
    runner: R,
    quiet: bool,
    config: &GauntletConfig,
    cwd: &Utf8Path,
    registry: &Registry,
    selection: &Selection,
) -> Result<RunOutcome, RunError> {
    let mut provision_settings = ProvisionSettings::from_config(config);
    // Test binaries run from their own package directory.
    provision_settings.cert_dir = absolute(cwd, &config.cert_dir);
    let mut coverage_settings = CoverageSettings::from_config(config);
    coverage_settings.coverage_dir = absolute(cwd, &config.coverage_dir);

    let provisioner = Provisioner::new(
        ComposeRuntime::new(config, ProcessCommandRunner),
        provision_settings,
        RunWorkspace::new(&absolute(cwd, &config.work_dir)),
    );
    let mut orchestrator = RunOrchestrator::new(Executor::new(runner, quiet), provisioner)
        .with_coverage(CoverageCollector::new(ProcessCommandRunner, coverage_settings));

    orchestrator.run(registry, selection, &mut io::stdout()).await
}

fn current_dir() -> Result<Utf8PathBuf, CliError> {
    let cwd = env::current_dir().map_err(|err| CliError::WorkingDirectory(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| CliError::WorkingDirectory(path.display().to_string()))
}

fn absolute(cwd: &Utf8Path, path: &str) -> Utf8PathBuf {
    let candidate = Utf8Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    }
}

fn report_outcome(mut target: impl Write, outcome: &RunOutcome) {
    match *outcome {
        RunOutcome::Failed {
            ref tag,
            exit_code,
        } => {
            writeln!(target, "target {tag} failed with exit code {exit_code}").ok();
        }
        RunOutcome::Completed {
            coverage: Some(CoverageOutcome::Generated { ref report }),
            ..
        } => {
            writeln!(target, "coverage report written to {report}").ok();
        }
        RunOutcome::Completed {
            coverage: Some(CoverageOutcome::Skipped(ref reason)),
            ..
        } => {
            writeln!(target, "coverage skipped: {reason}").ok();
        }
        RunOutcome::Listed { .. } | RunOutcome::Completed { coverage: None, .. } => {}
    }
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

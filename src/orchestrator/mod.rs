//! Drives one pass over the registry.
//!
//! Targets run strictly in registry order, one at a time. The first failing
//! target ends the run; nothing after it is provisioned or executed.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use thiserror::Error;

use crate::coverage::{CoverageArtifacts, CoverageCollector, CoverageOutcome};
use crate::executor::{Executor, merged_overrides};
use crate::process::{CommandRunner, ProcessCommandRunner, ProcessError};
use crate::provision::{ProvisionError, Provisioner, ServiceRuntime};
use crate::registry::Registry;
use crate::selector::matches;
use crate::target::{TargetDescriptor, TargetKind};

/// What the user asked this run to do.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    /// Tag pattern; `None` selects every target.
    pub pattern: Option<String>,
    /// Require the whole tag to equal the pattern.
    pub exact: bool,
    /// Print tags instead of running anything.
    pub list_only: bool,
    /// Arguments passed through to test harnesses.
    pub forwarded: Vec<String>,
    /// Collect coverage from unit targets.
    pub coverage: bool,
}

/// How a run ended when no fatal error occurred.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// Tags were listed.
    Listed {
        /// Number of distinct tags printed.
        count: usize,
    },
    /// Every selected target passed.
    Completed {
        /// Number of targets executed.
        executed: usize,
        /// Coverage result when coverage was requested.
        coverage: Option<CoverageOutcome>,
    },
    /// A target failed and the run stopped there.
    Failed {
        /// Tag of the failing target.
        tag: String,
        /// Exit code reported by the target.
        exit_code: i32,
    },
}

impl RunOutcome {
    /// Exit code the process should end with.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Listed { .. } | Self::Completed { .. } => 0,
            Self::Failed { exit_code, .. } => *exit_code,
        }
    }
}

/// Fatal errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The backing service for a target could not be provisioned.
    #[error("failed to provision service for {tag}: {source}")]
    Provision {
        /// Tag of the target that needed the service.
        tag: String,
        /// Underlying provisioning error.
        #[source]
        source: ProvisionError,
    },
    /// A target command could not be started.
    #[error("failed to run target: {0}")]
    Process(#[from] ProcessError),
}

/// Executes the selected part of a registry.
#[derive(Debug)]
pub struct RunOrchestrator<R, Rt, C = ProcessCommandRunner>
where
    R: CommandRunner,
    Rt: ServiceRuntime,
    C: CommandRunner,
{
    executor: Executor<R>,
    provisioner: Provisioner<Rt>,
    coverage: Option<CoverageCollector<C>>,
}

impl<R, Rt> RunOrchestrator<R, Rt>
where
    R: CommandRunner,
    Rt: ServiceRuntime,
{
    /// Creates an orchestrator without a coverage collector.
    #[must_use]
    pub const fn new(executor: Executor<R>, provisioner: Provisioner<Rt>) -> Self {
        Self {
            executor,
            provisioner,
            coverage: None,
        }
    }
}

impl<R, Rt, C> RunOrchestrator<R, Rt, C>
where
    R: CommandRunner,
    Rt: ServiceRuntime,
    C: CommandRunner,
{
    /// Attaches the collector used when a selection requests coverage.
    #[must_use]
    pub fn with_coverage<C2: CommandRunner>(
        self,
        collector: CoverageCollector<C2>,
    ) -> RunOrchestrator<R, Rt, C2> {
        RunOrchestrator {
            executor: self.executor,
            provisioner: self.provisioner,
            coverage: Some(collector),
        }
    }

    /// Runs or lists the selected targets, writing progress to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when a service cannot be provisioned or a target
    /// command cannot be started. A target that runs and fails is reported
    /// as [`RunOutcome::Failed`].
    pub async fn run<W: Write>(
        &mut self,
        registry: &Registry,
        selection: &Selection,
        out: &mut W,
    ) -> Result<RunOutcome, RunError> {
        if selection.list_only {
            return Ok(list_tags(registry, out));
        }

        let collector = if selection.coverage {
            self.coverage.as_ref()
        } else {
            None
        };
        if selection.coverage && collector.is_none() {
            tracing::warn!("coverage requested but no collector is configured");
        }
        if let Some(collector) = collector {
            if let Err(reason) = collector.prepare() {
                tracing::warn!(%reason, "could not reset raw coverage directory");
            }
        }

        let pattern = selection.pattern.as_deref().unwrap_or_default();
        let mut artifacts = CoverageArtifacts::new();
        let mut executed = 0;
        for target in registry.targets() {
            if !matches(&target.tag, pattern, selection.exact) {
                continue;
            }

            let connection = match target.required_service {
                Some(ref service) => Some(self.provisioner.provision(service).await.map_err(
                    |source| RunError::Provision {
                        tag: target.tag.clone(),
                        source,
                    },
                )?),
                None => None,
            };

            let instrument = collector.filter(|_| target.kind == TargetKind::Unit);
            let extra = instrument.map_or_else(BTreeMap::new, |active| active.profile_env(&target.tag));
            let overrides = merged_overrides(target, &extra, connection.as_ref());

            let exit_code =
                self.executor
                    .execute(target, overrides.clone(), &selection.forwarded, out)?;
            executed += 1;
            if exit_code != 0 {
                return Ok(RunOutcome::Failed {
                    tag: target.tag.clone(),
                    exit_code,
                });
            }

            if let Some(active) = instrument {
                active.discover(target, overrides, &mut artifacts);
            }
        }

        let coverage = collector.map(|active| active.collect(&artifacts));
        Ok(RunOutcome::Completed { executed, coverage })
    }
}

fn list_tags<W: Write>(registry: &Registry, out: &mut W) -> RunOutcome {
    let mut seen = HashSet::new();
    let distinct = registry
        .targets()
        .iter()
        .map(|target: &TargetDescriptor| target.tag.as_str())
        .filter(|tag| seen.insert(*tag));
    let mut count = 0;
    for tag in distinct {
        writeln!(out, "{tag}").ok();
        count += 1;
    }
    RunOutcome::Listed { count }
}

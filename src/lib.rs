//! Core library for the Gauntlet test-matrix driver.
//!
//! A run expands a configuration matrix into an ordered [`Registry`] of
//! targets, selects targets by tag, brings up the database service each
//! selected target needs, and executes the targets one at a time, stopping
//! at the first failure. Unit targets can optionally feed a source-based
//! coverage report.

pub mod config;
pub mod coverage;
pub mod engine;
pub mod executor;
pub mod orchestrator;
pub mod process;
pub mod provision;
pub mod registry;
pub mod selector;
pub mod target;
pub mod test_support;

pub use config::{ConfigError, GauntletConfig};
pub use coverage::{
    CoverageArtifacts, CoverageCollector, CoverageOutcome, CoverageSettings, CoverageSkip,
};
pub use engine::{Engine, EngineKind, UrlError};
pub use executor::{DATABASE_URL, Executor, merged_overrides};
pub use orchestrator::{RunError, RunOrchestrator, RunOutcome, Selection};
pub use process::{
    CommandOutput, CommandRunner, Invocation, ProcessCommandRunner, ProcessError,
    StreamingCommandRunner,
};
pub use provision::{
    ComposeRuntime, ProvisionError, ProvisionSettings, Provisioner, RunWorkspace, ServiceRuntime,
};
pub use registry::{MatrixSpec, Registry, RegistryError};
pub use selector::matches;
pub use target::{
    AuthVariant, ConnectionDescriptor, ServiceDescriptor, TargetDescriptor, TargetKind,
};

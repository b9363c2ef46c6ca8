//! Error type for provisioning failures.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::engine::UrlError;
use crate::process::ProcessError;

/// Fatal provisioning errors. Any of these aborts the current run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Neither a configured nor a detectable compose command exists.
    #[error("container runtime not found: install docker-compose or docker ({detail})")]
    RuntimeNotFound {
        /// What was looked for.
        detail: String,
    },
    /// The configured compose command line could not be tokenised.
    #[error("invalid compose command {command:?}: {message}")]
    InvalidCompose {
        /// Configured command line.
        command: String,
        /// Tokeniser error.
        message: String,
    },
    /// A runtime command could not be spawned.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// The runtime failed while listing containers for a service.
    #[error("failed to resolve container for {service}: {stderr}")]
    ContainerLookup {
        /// Service key.
        service: String,
        /// Stderr captured from the runtime.
        stderr: String,
    },
    /// No running container backs the service.
    #[error("no container found for {service}")]
    NoContainer {
        /// Service key.
        service: String,
    },
    /// Port inspection returned something other than a port number.
    #[error("could not resolve host port {internal_port} for container {container}: {output:?}")]
    Port {
        /// Container identifier.
        container: String,
        /// Port inside the container.
        internal_port: u16,
        /// Raw inspection output.
        output: String,
    },
    /// The engine family has no network endpoint to connect to.
    #[error("service {service} has no network endpoint")]
    NoEndpoint {
        /// Service key.
        service: String,
    },
    /// The connection URL could not be composed.
    #[error("cannot build connection URL for {service}: {source}")]
    Url {
        /// Service key.
        service: String,
        /// What was rejected.
        #[source]
        source: UrlError,
    },
    /// The service did not accept connections in time.
    #[error("service {service} not reachable at {host}:{port} after {waited_secs}s")]
    NotReady {
        /// Service key.
        service: String,
        /// Probed host.
        host: String,
        /// Probed port.
        port: u16,
        /// Probe budget in seconds.
        waited_secs: u64,
    },
    /// The per-run working copy could not be prepared.
    #[error("failed to prepare working copy at {path}: {message}")]
    Workspace {
        /// Path being prepared.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

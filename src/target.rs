//! Target and service descriptors produced by the registry.

use std::collections::BTreeMap;
use std::fmt;

use crate::engine::EngineKind;

/// Authentication flavour used when connecting to a backing service.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AuthVariant {
    /// Username and password.
    Plain,
    /// Client certificate and key; no password is sent.
    ClientCert,
}

impl AuthVariant {
    /// Segment appended to tags and service keys, empty for [`Self::Plain`].
    #[must_use]
    pub const fn tag_suffix(self) -> &'static str {
        match self {
            Self::Plain => "",
            Self::ClientCert => "_client_ssl",
        }
    }
}

impl fmt::Display for AuthVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::ClientCert => f.write_str("client-cert"),
        }
    }
}

/// Broad category of work a target performs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TargetKind {
    /// Type-check with a feature composition.
    Check,
    /// Lint a component.
    Lint,
    /// Build documentation.
    Doc,
    /// Run a component's own unit tests; the only kind that emits coverage.
    Unit,
    /// Run integration tests against a backing service.
    Integration,
}

impl TargetKind {
    /// Whether arguments forwarded from the command line apply to this kind.
    #[must_use]
    pub const fn runs_test_harness(self) -> bool {
        matches!(self, Self::Unit | Self::Integration)
    }
}

/// A backing service a target depends on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDescriptor {
    /// Engine family deciding port, grant and URL shape.
    pub engine_kind: EngineKind,
    /// Engine version as written in the matrix (for example `9.6`).
    pub version: String,
    /// Authentication flavour.
    pub variant: AuthVariant,
    /// Provisioning cache key; also the compose service name.
    pub key: String,
    /// Database name for networked engines, fixture path for the embedded
    /// engine.
    pub database: String,
    /// Extra query parameters appended to the connection URL.
    pub url_params: Vec<(String, String)>,
}

/// Connection details for a provisioned service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionDescriptor {
    /// Value exported to the target as `DATABASE_URL`.
    pub url: String,
    /// Host port mapped to the service, absent for file-based engines.
    pub port: Option<u16>,
}

/// One unit of work in the matrix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetDescriptor {
    /// Globally unique, hierarchical identifier.
    pub tag: String,
    /// What the target does.
    pub kind: TargetKind,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Environment layered over the parent environment.
    pub env_overrides: BTreeMap<String, String>,
    /// Arguments passed to the test harness after `--`.
    pub harness_args: Vec<String>,
    /// Service that must be provisioned before the command runs.
    pub required_service: Option<ServiceDescriptor>,
    /// Human readable description echoed before the command.
    pub comment: String,
}

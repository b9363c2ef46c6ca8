//! Matrix dimensions and the exclusion predicate for known-incompatible
//! combinations.

use crate::config::GauntletConfig;
use crate::target::AuthVariant;

/// Versions of one engine product to test against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineAxis {
    /// Engine name as understood by [`crate::engine::Engine`].
    pub engine: String,
    /// Versions in the order they are emitted; empty for unversioned engines.
    pub versions: Vec<String>,
}

impl EngineAxis {
    fn new(engine: &str, versions: &[&str]) -> Self {
        Self {
            engine: engine.to_owned(),
            versions: versions.iter().map(|v| (*v).to_owned()).collect(),
        }
    }
}

/// One integration combination, as seen by the exclusion predicate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Combination<'a> {
    /// Async runtime binding.
    pub runtime: &'a str,
    /// TLS backend.
    pub tls: &'a str,
    /// Engine product name.
    pub engine: &'a str,
    /// Engine version, empty for unversioned engines.
    pub version: &'a str,
    /// Authentication flavour.
    pub variant: AuthVariant,
}

/// Predicate returning `true` for combinations that must not be emitted.
pub type Exclusion = fn(&Combination<'_>) -> bool;

/// Static dimension lists the registry expands.
#[derive(Clone, Debug)]
pub struct MatrixSpec {
    /// Cargo executable.
    pub cargo_bin: String,
    /// Optional `+toolchain` argument.
    pub toolchain: Option<String>,
    /// Library name; component manifests live in `<library>-<component>`.
    pub library: String,
    /// Library components with their own manifests.
    pub components: Vec<String>,
    /// Async runtime bindings.
    pub runtimes: Vec<String>,
    /// TLS backends.
    pub tls_backends: Vec<String>,
    /// Engines and versions.
    pub engines: Vec<EngineAxis>,
    /// Authentication flavours.
    pub variants: Vec<AuthVariant>,
    /// Database name inside networked services.
    pub database: String,
    /// Fixture used by the embedded engine.
    pub sqlite_fixture: String,
    /// Directory holding the CA certificate referenced by client-cert URLs.
    pub cert_dir: String,
    /// Known-incompatible combinations.
    pub exclude: Exclusion,
}

impl MatrixSpec {
    /// Builds the standard matrix using tool locations from `config`.
    #[must_use]
    pub fn from_config(config: &GauntletConfig) -> Self {
        Self {
            cargo_bin: config.cargo_bin.clone(),
            toolchain: config.toolchain.clone(),
            library: config.library_name.clone(),
            components: ["core", "mysql", "postgres", "sqlite"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            runtimes: ["async-std", "tokio", "actix"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            tls_backends: ["native-tls", "rustls"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            engines: vec![
                EngineAxis::new("sqlite", &[]),
                EngineAxis::new("postgres", &["12", "10", "9.6", "9.5"]),
                EngineAxis::new("mysql", &["8", "5.7", "5.6"]),
                EngineAxis::new("mariadb", &["10.5", "10.4", "10.3", "10.2", "10.1"]),
            ],
            variants: vec![AuthVariant::Plain, AuthVariant::ClientCert],
            database: config.database_name.clone(),
            sqlite_fixture: config.sqlite_fixture.clone(),
            cert_dir: config.cert_dir.clone(),
            exclude: known_incompatible,
        }
    }

    /// Cargo program followed by the toolchain selector, if any.
    #[must_use]
    pub fn cargo_prefix(&self) -> Vec<String> {
        let mut prefix = vec![self.cargo_bin.clone()];
        prefix.extend(self.toolchain.iter().cloned());
        prefix
    }
}

/// Combinations the matrix never emits.
///
/// Client certificates are not meaningful for the embedded engine and are not
/// provisioned for `MySQL` 5.x; `rustls` cannot negotiate the TLS 1.0/1.1
/// cipher suites of `MySQL` 5.6 and 5.7.
#[must_use]
pub fn known_incompatible(combination: &Combination<'_>) -> bool {
    let legacy_mysql = combination.engine == "mysql" && combination.version.starts_with("5.");
    let client_cert = combination.variant == AuthVariant::ClientCert;

    (client_cert && (combination.engine == "sqlite" || legacy_mysql))
        || (combination.tls == "rustls" && legacy_mysql)
}

/// Accepts every combination.
#[must_use]
pub const fn exclude_nothing(_: &Combination<'_>) -> bool {
    false
}

//! Expands the configuration matrix into an ordered list of targets.
//!
//! The registry is rebuilt on every invocation. Ordering and tags depend
//! only on the [`MatrixSpec`], so external tooling can refer to a tag across
//! runs.

mod matrix;

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::engine::{Engine, EngineKind, UnknownEngine};
use crate::target::{AuthVariant, ServiceDescriptor, TargetDescriptor, TargetKind};

pub use matrix::{Combination, EngineAxis, Exclusion, MatrixSpec, exclude_nothing, known_incompatible};

const EMBEDDED_SERVICE_KEY: &str = "sqlite";
const LINT_ARGS: &[&str] = &["--all-features"];
const DOC_ARGS: &[&str] = &["--no-deps", "--all-features"];
const UNIT_ARGS: &[&str] = &["--lib"];

/// Configuration errors detected while building the registry, before any
/// target runs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    /// Two targets produced the same tag.
    #[error("duplicate target tag {tag}")]
    DuplicateTag {
        /// The colliding tag.
        tag: String,
    },
    /// The matrix names an engine without a service definition.
    #[error(transparent)]
    UnknownEngine(#[from] UnknownEngine),
    /// Two targets request the same service key with different definitions.
    #[error("service key {key} is defined more than once with different settings")]
    ConflictingService {
        /// The shared provisioning key.
        key: String,
    },
}

/// Flat, ordered, duplicate-free list of targets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registry {
    targets: Vec<TargetDescriptor>,
}

impl Registry {
    /// Expands `spec` into targets: checks, lints, docs, unit tests, then
    /// integration tests (runtime-major).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when an engine is unknown, a tag collides,
    /// or a service key is ambiguous.
    pub fn build(spec: &MatrixSpec) -> Result<Self, RegistryError> {
        let mut targets = Vec::new();
        targets.extend(check_targets(spec));
        targets.extend(component_targets(spec, TargetKind::Lint));
        targets.extend(component_targets(spec, TargetKind::Doc));
        targets.extend(component_targets(spec, TargetKind::Unit));
        targets.extend(integration_targets(spec)?);
        Self::from_targets(targets)
    }

    /// Wraps an explicit target list after validating tag uniqueness and
    /// service key consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTag`] or
    /// [`RegistryError::ConflictingService`].
    pub fn from_targets(targets: Vec<TargetDescriptor>) -> Result<Self, RegistryError> {
        let mut tags = HashSet::with_capacity(targets.len());
        let mut services: HashMap<&str, &ServiceDescriptor> = HashMap::new();

        for target in &targets {
            if !tags.insert(target.tag.as_str()) {
                return Err(RegistryError::DuplicateTag {
                    tag: target.tag.clone(),
                });
            }
            if let Some(ref service) = target.required_service {
                let known = services.entry(service.key.as_str()).or_insert(service);
                if *known != service {
                    return Err(RegistryError::ConflictingService {
                        key: service.key.clone(),
                    });
                }
            }
        }

        Ok(Self { targets })
    }

    /// Targets in registry order.
    #[must_use]
    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    /// Tags in registry order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|target| target.tag.as_str())
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry holds no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn cargo_command(spec: &MatrixSpec, subcommand: &str, args: &[&str]) -> Vec<String> {
    let mut command = spec.cargo_prefix();
    command.push(subcommand.to_owned());
    command.extend(args.iter().map(|arg| (*arg).to_owned()));
    command
}

fn target(tag: String, kind: TargetKind, command: Vec<String>, comment: String) -> TargetDescriptor {
    TargetDescriptor {
        tag,
        kind,
        command,
        env_overrides: BTreeMap::new(),
        harness_args: Vec::new(),
        required_service: None,
        comment,
    }
}

fn check_targets(spec: &MatrixSpec) -> Vec<TargetDescriptor> {
    let mut targets = Vec::new();
    for runtime in &spec.runtimes {
        for tls in &spec.tls_backends {
            let features = format!("runtime-{runtime}-{tls},all-databases,all-types");
            targets.push(target(
                format!("check:{runtime}:{tls}"),
                TargetKind::Check,
                cargo_command(
                    spec,
                    "check",
                    &["--no-default-features", "--features", features.as_str()],
                ),
                format!("check with {runtime} and {tls}"),
            ));
        }
    }
    targets
}

/// Components followed by the root crate, paired with their manifests.
fn manifests(spec: &MatrixSpec) -> Vec<(String, String)> {
    let mut manifests: Vec<(String, String)> = spec
        .components
        .iter()
        .map(|component| {
            (
                component.clone(),
                format!("{}-{component}/Cargo.toml", spec.library),
            )
        })
        .collect();
    manifests.push((spec.library.clone(), String::from("Cargo.toml")));
    manifests
}

fn component_targets(spec: &MatrixSpec, kind: TargetKind) -> Vec<TargetDescriptor> {
    let (prefix, subcommand, extra, verb) = match kind {
        TargetKind::Lint => ("lint", "clippy", LINT_ARGS, "lint"),
        TargetKind::Doc => ("doc", "doc", DOC_ARGS, "document"),
        TargetKind::Unit => ("unit", "test", UNIT_ARGS, "unit test"),
        TargetKind::Check | TargetKind::Integration => return Vec::new(),
    };

    manifests(spec)
        .into_iter()
        .map(|(component, manifest)| {
            let mut args = vec!["--manifest-path", manifest.as_str()];
            args.extend_from_slice(extra);
            let mut descriptor = target(
                format!("{prefix}:{component}"),
                kind,
                cargo_command(spec, subcommand, &args),
                format!("{verb} {component}"),
            );
            if kind == TargetKind::Doc {
                descriptor
                    .env_overrides
                    .insert(String::from("RUSTDOCFLAGS"), String::from("--cfg docsrs"));
            }
            descriptor
        })
        .collect()
}

fn integration_targets(spec: &MatrixSpec) -> Result<Vec<TargetDescriptor>, RegistryError> {
    let axes = spec
        .engines
        .iter()
        .map(|axis| axis.engine.parse::<Engine>().map(|engine| (engine, axis)))
        .collect::<Result<Vec<_>, UnknownEngine>>()?;

    let unversioned = [String::new()];
    let mut targets = Vec::new();
    for runtime in &spec.runtimes {
        for tls in &spec.tls_backends {
            for (engine, axis) in &axes {
                let versions = if axis.versions.is_empty() {
                    &unversioned[..]
                } else {
                    &axis.versions[..]
                };
                for version in versions {
                    for variant in &spec.variants {
                        let combination = Combination {
                            runtime,
                            tls,
                            engine: engine.name(),
                            version,
                            variant: *variant,
                        };
                        if (spec.exclude)(&combination) {
                            continue;
                        }
                        targets.push(integration_target(spec, *engine, &combination));
                    }
                }
            }
        }
    }
    Ok(targets)
}

fn integration_target(
    spec: &MatrixSpec,
    engine: Engine,
    combination: &Combination<'_>,
) -> TargetDescriptor {
    let service = service_for(spec, engine, combination);
    let version_segment = if combination.version.is_empty() {
        String::new()
    } else {
        format!("_{}", combination.version.replace('.', "_"))
    };
    let tag = format!(
        "{}{version_segment}{}_{}_{}",
        engine.name(),
        combination.variant.tag_suffix(),
        combination.runtime,
        combination.tls
    );
    let features = format!(
        "any,macros,migrate,all-types,{},runtime-{}-{}",
        engine.feature(),
        combination.runtime,
        combination.tls
    );
    let version = if combination.version.is_empty() {
        String::new()
    } else {
        format!(" {}", combination.version)
    };
    let comment = format!(
        "test {}{version} ({}) with {} and {}",
        engine.name(),
        combination.variant,
        combination.runtime,
        combination.tls
    );

    let mut descriptor = target(
        tag,
        TargetKind::Integration,
        cargo_command(
            spec,
            "test",
            &["--no-default-features", "--features", features.as_str()],
        ),
        comment,
    );
    if engine.kind() == EngineKind::EmbeddedFile {
        // The embedded driver does not support concurrent access to one file.
        descriptor.harness_args.push(String::from("--test-threads=1"));
    }
    descriptor.required_service = Some(service);
    descriptor
}

fn service_for(spec: &MatrixSpec, engine: Engine, combination: &Combination<'_>) -> ServiceDescriptor {
    let kind = engine.kind();
    if kind == EngineKind::EmbeddedFile {
        return ServiceDescriptor {
            engine_kind: kind,
            version: combination.version.to_owned(),
            variant: AuthVariant::Plain,
            key: String::from(EMBEDDED_SERVICE_KEY),
            database: spec.sqlite_fixture.clone(),
            url_params: Vec::new(),
        };
    }

    let key = format!(
        "{}_{}{}",
        engine.name(),
        combination.version.replace('.', "_"),
        combination.variant.tag_suffix()
    );
    ServiceDescriptor {
        engine_kind: kind,
        version: combination.version.to_owned(),
        variant: combination.variant,
        key,
        database: spec.database.clone(),
        url_params: verification_params(spec, kind, combination.variant),
    }
}

fn verification_params(spec: &MatrixSpec, kind: EngineKind, variant: AuthVariant) -> Vec<(String, String)> {
    if variant != AuthVariant::ClientCert {
        return Vec::new();
    }
    let ca = format!("{}/ca.crt", spec.cert_dir);
    let (mode_key, mode, ca_key) = match kind {
        EngineKind::PostgresFamily => ("sslmode", "verify-ca", "sslrootcert"),
        EngineKind::MysqlFamily => ("ssl-mode", "VERIFY_CA", "ssl-ca"),
        EngineKind::EmbeddedFile => return Vec::new(),
    };
    vec![
        (mode_key.to_owned(), mode.to_owned()),
        (ca_key.to_owned(), ca),
    ]
}

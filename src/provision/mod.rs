//! Backing-service provisioning.
//!
//! [`Provisioner::provision`] makes sure the service a target needs is up
//! and returns the URL the target should use. Results are memoised by
//! service key for the lifetime of one provisioner, which the orchestrator
//! keeps for exactly one run. Nothing here coordinates with other runs
//! against the same container runtime.

mod error;
mod readiness;
mod runtime;
mod workspace;

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::time::sleep;

use crate::config::GauntletConfig;
use crate::engine::{ClientCertificate, EngineKind, UrlParts, embedded_file_url};
use crate::target::{ConnectionDescriptor, ServiceDescriptor};

pub use error::ProvisionError;
pub use readiness::wait_until_reachable;
pub use runtime::{ComposeRuntime, ServiceRuntime, StartOutcome, classify_start};
pub use workspace::RunWorkspace;

/// Timing and location settings for provisioning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionSettings {
    /// Host the runtime publishes ports on.
    pub host: String,
    /// Directory holding `client.crt` and `client.key`.
    pub cert_dir: Utf8PathBuf,
    /// Blind delay after a fresh start.
    pub cold_start_delay: Duration,
    /// TCP probe budget after a fresh start; `None` skips probing.
    pub readiness_timeout: Option<Duration>,
    /// Pause between probe attempts.
    pub readiness_poll_interval: Duration,
}

impl ProvisionSettings {
    /// Reads settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &GauntletConfig) -> Self {
        Self {
            host: config.service_host.clone(),
            cert_dir: Utf8PathBuf::from(&config.cert_dir),
            cold_start_delay: config.cold_start_delay(),
            readiness_timeout: config.readiness_timeout(),
            readiness_poll_interval: config.readiness_poll_interval(),
        }
    }
}

/// Resolves services to connection descriptors, at most once per key.
#[derive(Debug)]
pub struct Provisioner<Rt: ServiceRuntime> {
    runtime: Rt,
    settings: ProvisionSettings,
    workspace: RunWorkspace,
    resolved: HashMap<String, ConnectionDescriptor>,
}

impl<Rt: ServiceRuntime> Provisioner<Rt> {
    /// Creates a provisioner with an empty memo.
    #[must_use]
    pub fn new(runtime: Rt, settings: ProvisionSettings, workspace: RunWorkspace) -> Self {
        Self {
            runtime,
            settings,
            workspace,
            resolved: HashMap::new(),
        }
    }

    /// The per-run workspace receiving file-based working copies.
    #[must_use]
    pub const fn workspace(&self) -> &RunWorkspace {
        &self.workspace
    }

    /// Ensures `service` is reachable and returns how to connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the runtime is missing, no container
    /// resolves, the port cannot be determined, the service never becomes
    /// reachable, or the working copy cannot be prepared.
    pub async fn provision(
        &mut self,
        service: &ServiceDescriptor,
    ) -> Result<ConnectionDescriptor, ProvisionError> {
        if let Some(known) = self.resolved.get(&service.key) {
            tracing::debug!(service = %service.key, "reusing resolved connection");
            return Ok(known.clone());
        }

        let connection = match service.engine_kind {
            EngineKind::EmbeddedFile => self.provision_embedded(service)?,
            EngineKind::MysqlFamily | EngineKind::PostgresFamily => {
                self.provision_networked(service).await?
            }
        };
        self.resolved
            .insert(service.key.clone(), connection.clone());
        Ok(connection)
    }

    fn provision_embedded(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<ConnectionDescriptor, ProvisionError> {
        let copy = self
            .workspace
            .working_copy(Utf8Path::new(&service.database))?;
        tracing::info!(service = %service.key, path = %copy, "prepared working copy");
        let url = embedded_file_url(&copy).map_err(|source| ProvisionError::Url {
            service: service.key.clone(),
            source,
        })?;
        Ok(ConnectionDescriptor { url, port: None })
    }

    async fn provision_networked(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<ConnectionDescriptor, ProvisionError> {
        let kind = service.engine_kind;
        let key = service.key.as_str();
        let internal_port = kind
            .internal_port()
            .ok_or_else(|| ProvisionError::NoEndpoint {
                service: key.to_owned(),
            })?;

        let fresh = self.runtime.start(key)? == StartOutcome::Started;
        if fresh && !self.settings.cold_start_delay.is_zero() {
            tracing::info!(
                service = key,
                delay_secs = self.settings.cold_start_delay.as_secs(),
                "waiting for freshly started service"
            );
            sleep(self.settings.cold_start_delay).await;
        }

        let container = self.runtime.container_id(key)?;
        let port = self.runtime.host_port(&container, internal_port)?;
        tracing::info!(service = key, %container, port, fresh, "service running");

        if fresh {
            self.await_readiness(key, port).await?;
        }

        if let Some(grant) = kind.default_admin_grant(service.variant) {
            let output = self.runtime.exec(&container, &grant)?;
            if !output.is_success() {
                tracing::warn!(service = key, stderr = %output.stderr.trim(), "administrative grant failed");
            }
        }

        let cert = self.settings.cert_dir.join("client.crt");
        let cert_key = self.settings.cert_dir.join("client.key");
        let url = kind
            .build_url(&UrlParts {
                host: &self.settings.host,
                port,
                database: &service.database,
                variant: service.variant,
                certificate: ClientCertificate {
                    cert: &cert,
                    key: &cert_key,
                },
                extra_params: &service.url_params,
            })
            .map_err(|source| ProvisionError::Url {
                service: key.to_owned(),
                source,
            })?;

        Ok(ConnectionDescriptor {
            url,
            port: Some(port),
        })
    }

    async fn await_readiness(&self, service: &str, port: u16) -> Result<(), ProvisionError> {
        let Some(budget) = self.settings.readiness_timeout else {
            return Ok(());
        };
        let host = self.settings.host.as_str();
        if wait_until_reachable(host, port, budget, self.settings.readiness_poll_interval).await {
            return Ok(());
        }
        Err(ProvisionError::NotReady {
            service: service.to_owned(),
            host: host.to_owned(),
            port,
            waited_secs: budget.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests;

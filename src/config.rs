//! Configuration loading via `ortho-config`.
//!
//! Tooling paths, service locations and readiness timings come from layered
//! sources: defaults, `gauntlet.toml`, then `GAUNTLET_*` environment
//! variables. Selection flags live on the command line instead.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Settings for a matrix run.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GAUNTLET",
    discovery(
        app_name = "gauntlet",
        env_var = "GAUNTLET_CONFIG_PATH",
        config_file_name = "gauntlet.toml",
        dotfile_name = ".gauntlet.toml",
        project_file_name = "gauntlet.toml"
    )
)]
pub struct GauntletConfig {
    /// Path to the `cargo` executable.
    #[ortho_config(default = "cargo".to_owned())]
    pub cargo_bin: String,
    /// Toolchain override inserted after the cargo binary, for example
    /// `+nightly`.
    pub toolchain: Option<String>,
    /// Prefix of the per-component manifest directories (`<name>-core`).
    #[ortho_config(default = "sqlx".to_owned())]
    pub library_name: String,
    /// Database created inside every networked service.
    #[ortho_config(default = "sqlx".to_owned())]
    pub database_name: String,
    /// Path to the `docker` executable used for `inspect` and `exec`.
    #[ortho_config(default = "docker".to_owned())]
    pub docker_bin: String,
    /// Compose command line, for example `docker compose`. Detected when
    /// unset.
    pub compose_bin: Option<String>,
    /// Compose project name isolating the services.
    #[ortho_config(default = "gauntlet".to_owned())]
    pub compose_project: String,
    /// Directory holding the compose file.
    #[ortho_config(default = "tests".to_owned())]
    pub compose_dir: String,
    /// Directory holding `ca.crt`, `client.crt` and `client.key`.
    #[ortho_config(default = "tests/certs".to_owned())]
    pub cert_dir: String,
    /// Pristine database file for the embedded engine.
    #[ortho_config(default = "tests/sqlite/sqlite.db".to_owned())]
    pub sqlite_fixture: String,
    /// Directory receiving per-run working copies.
    #[ortho_config(default = ".gauntlet".to_owned())]
    pub work_dir: String,
    /// Directory receiving raw profiles and the merged report.
    #[ortho_config(default = ".coverage".to_owned())]
    pub coverage_dir: String,
    /// Path to the HTML coverage renderer.
    #[ortho_config(default = "genhtml".to_owned())]
    pub genhtml_bin: String,
    /// Host that mapped service ports are published on.
    #[ortho_config(default = "localhost".to_owned())]
    pub service_host: String,
    /// Blind delay applied after a service is freshly started.
    #[ortho_config(default = 0)]
    pub cold_start_delay_secs: u64,
    /// Upper bound for the TCP readiness probe; `0` disables probing.
    #[ortho_config(default = 60)]
    pub readiness_timeout_secs: u64,
    /// Pause between readiness probe attempts.
    #[ortho_config(default = 500)]
    pub readiness_poll_millis: u64,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl GauntletConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails, or
    /// [`ConfigError::MissingField`] when validation fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("gauntlet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects blank values for every required field. Messages name both the
    /// environment variable and the TOML key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for the first blank field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.cargo_bin, "cargo_bin"),
            (&self.library_name, "library_name"),
            (&self.database_name, "database_name"),
            (&self.docker_bin, "docker_bin"),
            (&self.compose_project, "compose_project"),
            (&self.compose_dir, "compose_dir"),
            (&self.cert_dir, "cert_dir"),
            (&self.sqlite_fixture, "sqlite_fixture"),
            (&self.work_dir, "work_dir"),
            (&self.coverage_dir, "coverage_dir"),
            (&self.genhtml_bin, "genhtml_bin"),
            (&self.service_host, "service_host"),
        ];
        for (value, field) in required {
            Self::require_field(value, field)?;
        }
        if let Some(ref compose) = self.compose_bin {
            Self::require_field(compose, "compose_bin")?;
        }
        Ok(())
    }

    fn require_field(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "{field}: set GAUNTLET_{} or add {field} to gauntlet.toml",
                field.to_uppercase()
            )));
        }
        Ok(())
    }

    /// Blind delay after a fresh service start.
    #[must_use]
    pub const fn cold_start_delay(&self) -> Duration {
        Duration::from_secs(self.cold_start_delay_secs)
    }

    /// Readiness probe budget; `None` when probing is disabled.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Option<Duration> {
        if self.readiness_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.readiness_timeout_secs))
        }
    }

    /// Pause between readiness probe attempts.
    #[must_use]
    pub const fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_config;
    use rstest::rstest;

    #[rstest]
    fn sample_config_validates() {
        assert_eq!(sample_config().validate(), Ok(()));
    }

    #[rstest]
    #[case::cargo(|cfg: &mut GauntletConfig| cfg.cargo_bin.clear(), "GAUNTLET_CARGO_BIN")]
    #[case::host(|cfg: &mut GauntletConfig| cfg.service_host = String::from("  "), "GAUNTLET_SERVICE_HOST")]
    #[case::compose(|cfg: &mut GauntletConfig| cfg.compose_bin = Some(String::new()), "GAUNTLET_COMPOSE_BIN")]
    fn blank_fields_produce_actionable_errors(
        #[case] mutate: fn(&mut GauntletConfig),
        #[case] env_var: &str,
    ) {
        let mut cfg = sample_config();
        mutate(&mut cfg);

        let message = cfg.validate().expect_err("blank field").to_string();
        assert!(message.contains(env_var), "{message}");
        assert!(message.contains("gauntlet.toml"), "{message}");
        assert_eq!(message.matches("missing").count(), 1, "{message}");
    }

    #[rstest]
    fn blank_field_message_names_the_field_once() {
        let cfg = GauntletConfig {
            cargo_bin: String::new(),
            ..sample_config()
        };

        assert_eq!(
            cfg.validate().expect_err("blank cargo_bin").to_string(),
            "missing configuration field: cargo_bin: set GAUNTLET_CARGO_BIN or add cargo_bin to gauntlet.toml"
        );
    }

    #[rstest]
    fn zero_timeout_disables_probe() {
        let cfg = GauntletConfig {
            readiness_timeout_secs: 0,
            ..sample_config()
        };
        assert_eq!(cfg.readiness_timeout(), None);
        assert_eq!(
            sample_config().readiness_timeout(),
            Some(Duration::from_secs(60))
        );
    }
}

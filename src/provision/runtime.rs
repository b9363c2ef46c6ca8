//! Container runtime access through the compose CLI.

use camino::Utf8PathBuf;

use super::error::ProvisionError;
use crate::config::GauntletConfig;
use crate::process::{CommandOutput, CommandRunner, Invocation};

/// What the runtime reported when asked to start a service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartOutcome {
    /// The service was created or started by this request.
    Started,
    /// The service was already up to date.
    AlreadyRunning,
}

/// Operations the provisioner needs from a container runtime.
pub trait ServiceRuntime {
    /// Idempotently starts `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the runtime cannot be invoked.
    fn start(&self, service: &str) -> Result<StartOutcome, ProvisionError>;

    /// Resolves the running container backing `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::NoContainer`] when nothing is running.
    fn container_id(&self, service: &str) -> Result<String, ProvisionError>;

    /// Resolves the host port published for `internal_port`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Port`] when the result is not a port number.
    fn host_port(&self, container: &str, internal_port: u16) -> Result<u16, ProvisionError>;

    /// Runs `command` inside `container`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the runtime cannot be invoked.
    fn exec(&self, container: &str, command: &[String]) -> Result<CommandOutput, ProvisionError>;
}

/// [`ServiceRuntime`] backed by `docker compose` (or `docker-compose`) and
/// `docker`.
#[derive(Clone, Debug)]
pub struct ComposeRuntime<R: CommandRunner> {
    runner: R,
    compose_bin: Option<String>,
    docker_bin: String,
    project: String,
    dir: Utf8PathBuf,
}

impl<R: CommandRunner> ComposeRuntime<R> {
    /// Creates a runtime using the compose settings from `config`.
    #[must_use]
    pub fn new(config: &GauntletConfig, runner: R) -> Self {
        Self {
            runner,
            compose_bin: config.compose_bin.clone(),
            docker_bin: config.docker_bin.clone(),
            project: config.compose_project.clone(),
            dir: Utf8PathBuf::from(&config.compose_dir),
        }
    }

    /// Compose program and leading arguments. The configured command wins;
    /// otherwise `docker-compose` and then `docker compose` are looked up on
    /// `PATH`.
    fn compose_command(&self) -> Result<Vec<String>, ProvisionError> {
        if let Some(ref configured) = self.compose_bin {
            let words =
                shell_words::split(configured).map_err(|err| ProvisionError::InvalidCompose {
                    command: configured.clone(),
                    message: err.to_string(),
                })?;
            if words.is_empty() {
                return Err(ProvisionError::InvalidCompose {
                    command: configured.clone(),
                    message: String::from("empty command"),
                });
            }
            return Ok(words);
        }
        if which::which("docker-compose").is_ok() {
            return Ok(vec![String::from("docker-compose")]);
        }
        if which::which(&self.docker_bin).is_ok() {
            return Ok(vec![self.docker_bin.clone(), String::from("compose")]);
        }
        Err(ProvisionError::RuntimeNotFound {
            detail: format!("neither docker-compose nor {} is on PATH", self.docker_bin),
        })
    }

    fn compose(&self, args: &[&str]) -> Result<CommandOutput, ProvisionError> {
        let mut words = self.compose_command()?.into_iter();
        let program = words.next().ok_or_else(|| ProvisionError::RuntimeNotFound {
            detail: String::from("empty compose command"),
        })?;
        let invocation = Invocation::new(program)
            .args(words)
            .args(["-p", self.project.as_str()])
            .args(args.iter().copied())
            .current_dir(self.dir.clone());
        Ok(self.runner.run(&invocation)?)
    }

    fn docker(&self, args: Vec<String>) -> Result<CommandOutput, ProvisionError> {
        let invocation = Invocation::new(self.docker_bin.clone())
            .args(args)
            .current_dir(self.dir.clone());
        Ok(self.runner.run(&invocation)?)
    }
}

impl<R: CommandRunner> ServiceRuntime for ComposeRuntime<R> {
    fn start(&self, service: &str) -> Result<StartOutcome, ProvisionError> {
        let output = self.compose(&["up", "-d", service])?;
        if !output.is_success() {
            // The container lookup that follows decides whether this is fatal.
            tracing::warn!(service, stderr = %output.stderr.trim(), "compose up failed");
        }
        Ok(classify_start(&output))
    }

    fn container_id(&self, service: &str) -> Result<String, ProvisionError> {
        let output = self.compose(&["ps", "-q", service])?;
        if !output.is_success() {
            return Err(ProvisionError::ContainerLookup {
                service: service.to_owned(),
                stderr: output.stderr.trim().to_owned(),
            });
        }
        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| ProvisionError::NoContainer {
                service: service.to_owned(),
            })
    }

    fn host_port(&self, container: &str, internal_port: u16) -> Result<u16, ProvisionError> {
        let format =
            format!("{{{{(index (index .NetworkSettings.Ports \"{internal_port}/tcp\") 0).HostPort}}}}");
        let output = self.docker(vec![
            String::from("inspect"),
            String::from("-f"),
            format,
            container.to_owned(),
        ])?;
        parse_port(&output.stdout).ok_or_else(|| ProvisionError::Port {
            container: container.to_owned(),
            internal_port,
            output: if output.is_success() {
                output.stdout.trim().to_owned()
            } else {
                output.stderr.trim().to_owned()
            },
        })
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<CommandOutput, ProvisionError> {
        let mut args = vec![String::from("exec"), container.to_owned()];
        args.extend_from_slice(command);
        self.docker(args)
    }
}

/// Interprets compose `up` output. Anything that mentions creating or
/// starting a container counts as a fresh start.
#[must_use]
pub fn classify_start(output: &CommandOutput) -> StartOutcome {
    const FRESH_MARKERS: [&str; 4] = ["Started", "Created", "Recreated", "done"];
    let fresh = [&output.stdout, &output.stderr]
        .iter()
        .any(|stream| FRESH_MARKERS.iter().any(|marker| stream.contains(marker)));
    if fresh {
        StartOutcome::Started
    } else {
        StartOutcome::AlreadyRunning
    }
}

fn parse_port(stdout: &str) -> Option<u16> {
    stdout.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

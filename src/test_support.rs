//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::config::GauntletConfig;
use crate::process::{CommandOutput, CommandRunner, Invocation, ProcessError};
use crate::provision::{ProvisionError, ServiceRuntime, StartOutcome};

/// Configuration populated with the documented defaults, independent of the
/// environment the tests run in.
#[must_use]
pub fn sample_config() -> GauntletConfig {
    GauntletConfig {
        cargo_bin: String::from("cargo"),
        toolchain: None,
        library_name: String::from("sqlx"),
        database_name: String::from("sqlx"),
        docker_bin: String::from("docker"),
        compose_bin: None,
        compose_project: String::from("gauntlet"),
        compose_dir: String::from("tests"),
        cert_dir: String::from("tests/certs"),
        sqlite_fixture: String::from("tests/sqlite/sqlite.db"),
        work_dir: String::from(".gauntlet"),
        coverage_dir: String::from(".coverage"),
        genhtml_bin: String::from("genhtml"),
        service_host: String::from("localhost"),
        cold_start_delay_secs: 0,
        readiness_timeout_secs: 60,
        readiness_poll_millis: 500,
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Clones share the queue and the invocation log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<Invocation>>>,
    streams: bool,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner that claims to have streamed output live.
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            streams: true,
            ..Self::default()
        }
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    /// Returns each recorded invocation as a space-joined command line.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(|invocation| invocation.argv().join(" "))
            .collect()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        self.invocations.borrow_mut().push(invocation.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ProcessError::Spawn {
                program: invocation.program.clone(),
                message: String::from("no scripted response available"),
            })
    }

    fn streams_output(&self) -> bool {
        self.streams
    }
}

/// Call counters recorded by [`StubRuntime`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RuntimeCalls {
    /// Number of start requests.
    pub start: usize,
    /// Number of container lookups.
    pub container_id: usize,
    /// Number of port resolutions.
    pub host_port: usize,
    /// Number of in-container commands.
    pub exec: usize,
}

#[derive(Debug)]
struct StubState {
    outcome: StartOutcome,
    container: Option<String>,
    port: u16,
    calls: RuntimeCalls,
    started: Vec<String>,
    executed: Vec<Vec<String>>,
}

/// In-memory container runtime that counts every call.
///
/// Clones share state, so a test can keep one handle while the provisioner
/// owns another.
#[derive(Clone, Debug)]
pub struct StubRuntime {
    state: Rc<RefCell<StubState>>,
}

impl StubRuntime {
    /// A runtime whose services are already running on `port`.
    #[must_use]
    pub fn running_on(port: u16) -> Self {
        Self {
            state: Rc::new(RefCell::new(StubState {
                outcome: StartOutcome::AlreadyRunning,
                container: Some(String::from("c0ffee")),
                port,
                calls: RuntimeCalls::default(),
                started: Vec::new(),
                executed: Vec::new(),
            })),
        }
    }

    /// Makes every start report a fresh start.
    #[must_use]
    pub fn fresh(self) -> Self {
        self.state.borrow_mut().outcome = StartOutcome::Started;
        self
    }

    /// Makes container lookups find nothing.
    #[must_use]
    pub fn without_container(self) -> Self {
        self.state.borrow_mut().container = None;
        self
    }

    /// Call counters so far.
    #[must_use]
    pub fn calls(&self) -> RuntimeCalls {
        self.state.borrow().calls
    }

    /// Service keys passed to start, in order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.state.borrow().started.clone()
    }

    /// Commands passed to exec, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.state.borrow().executed.clone()
    }
}

impl ServiceRuntime for StubRuntime {
    fn start(&self, service: &str) -> Result<StartOutcome, ProvisionError> {
        let mut state = self.state.borrow_mut();
        state.calls.start += 1;
        state.started.push(service.to_owned());
        Ok(state.outcome)
    }

    fn container_id(&self, service: &str) -> Result<String, ProvisionError> {
        let mut state = self.state.borrow_mut();
        state.calls.container_id += 1;
        state
            .container
            .clone()
            .ok_or_else(|| ProvisionError::NoContainer {
                service: service.to_owned(),
            })
    }

    fn host_port(&self, _container: &str, _internal_port: u16) -> Result<u16, ProvisionError> {
        let mut state = self.state.borrow_mut();
        state.calls.host_port += 1;
        Ok(state.port)
    }

    fn exec(&self, _container: &str, command: &[String]) -> Result<CommandOutput, ProvisionError> {
        let mut state = self.state.borrow_mut();
        state.calls.exec += 1;
        state.executed.push(command.to_vec());
        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

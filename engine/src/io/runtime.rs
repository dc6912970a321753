//! Container runtime abstraction.
//!
//! The [`RuntimeClient`] trait is the only seam between the engine and the
//! isolation backend. [`DockerRuntime`] shells out to the `docker` CLI; tests
//! use an in-process double that simulates environment states.

use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::RuntimeConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Failure reported by a runtime call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),
    #[error("environment {0} already exists")]
    NameConflict(String),
    #[error("{op} failed: {message}")]
    Failed { op: &'static str, message: String },
}

/// Parameters for creating a detached, auto-restarting environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub restart_policy: String,
    /// Non-terminating process that keeps the environment alive.
    pub command: Vec<String>,
}

/// Result of running a command inside an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// `None` when the process was killed (e.g. on timeout).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Narrow capability interface over the container runtime.
pub trait RuntimeClient: Send + Sync {
    /// Names of all environments, running or stopped.
    fn list_all(&self) -> Result<Vec<String>, RuntimeError>;
    fn is_running(&self, name: &str) -> Result<bool, RuntimeError>;
    fn create_detached(&self, spec: &CreateSpec) -> Result<(), RuntimeError>;
    fn start(&self, name: &str) -> Result<(), RuntimeError>;
    fn force_remove(&self, name: &str) -> Result<(), RuntimeError>;
    /// Run `argv` inside `name`, bounded by `timeout`.
    fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError>;
}

/// Runtime client that drives the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
    control_timeout: Duration,
    output_limit_bytes: usize,
}

impl DockerRuntime {
    pub fn new(config: &RuntimeConfig, output_limit_bytes: usize) -> Self {
        Self {
            binary: config.binary.clone(),
            control_timeout: Duration::from_secs(config.control_timeout_secs),
            output_limit_bytes,
        }
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Run a control-plane call and require a zero exit status.
    fn control(&self, op: &'static str, cmd: Command) -> Result<String, RuntimeError> {
        let output = self.spawn(cmd, self.control_timeout)?;
        if output.timed_out {
            return Err(RuntimeError::Failed {
                op,
                message: format!("timed out after {:?}", self.control_timeout),
            });
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(op, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, cmd: Command, timeout: Duration) -> Result<CommandOutput, RuntimeError> {
        run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .map_err(|err| RuntimeError::Unreachable(format!("{} ({err:#})", self.binary)))
    }
}

impl RuntimeClient for DockerRuntime {
    #[instrument(skip_all)]
    fn list_all(&self) -> Result<Vec<String>, RuntimeError> {
        let stdout = self.control("list", self.command(["ps", "-a", "--format", "{{.Names}}"]))?;
        Ok(parse_names(&stdout))
    }

    #[instrument(skip_all, fields(name = %name))]
    fn is_running(&self, name: &str) -> Result<bool, RuntimeError> {
        let stdout = self.control(
            "inspect",
            self.command(["inspect", "-f", "{{.State.Running}}", name]),
        )?;
        Ok(stdout.trim() == "true")
    }

    #[instrument(skip_all, fields(name = %spec.name, image = %spec.image))]
    fn create_detached(&self, spec: &CreateSpec) -> Result<(), RuntimeError> {
        let mut cmd = self.command([
            "run",
            "-d",
            "--restart",
            spec.restart_policy.as_str(),
            "--name",
            spec.name.as_str(),
            spec.image.as_str(),
        ]);
        cmd.args(&spec.command);
        self.control("create", cmd).map(|id| {
            debug!(container_id = id.trim(), "environment created");
        })
    }

    #[instrument(skip_all, fields(name = %name))]
    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.control("start", self.command(["start", name]))
            .map(|_| ())
    }

    #[instrument(skip_all, fields(name = %name))]
    fn force_remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.control("remove", self.command(["rm", "-f", name]))
            .map(|_| ())
    }

    #[instrument(skip_all, fields(name = %name, timeout_ms = timeout.as_millis() as u64))]
    fn exec(
        &self,
        name: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut cmd = self.command(["exec", name]);
        cmd.args(argv);
        let output = self.spawn(cmd, timeout)?;
        if output.timed_out {
            warn!("exec timed out; process left to runtime reaping");
        }
        Ok(ExecOutput {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

/// Split `ps --format {{.Names}}` output into names.
pub fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Map runtime stderr to a typed error.
pub fn classify_failure(op: &'static str, stderr: &str) -> RuntimeError {
    let message = stderr.trim().to_string();
    if message.contains("Cannot connect to the Docker daemon")
        || message.contains("Is the docker daemon running")
        || message.contains("error during connect")
    {
        return RuntimeError::Unreachable(message);
    }
    if message.contains("is already in use") || message.contains("already exists") {
        return RuntimeError::NameConflict(message);
    }
    RuntimeError::Failed { op, message }
}

//! Execution pipeline: filter, then run inside the learner's environment.
//!
//! Every path resolves to text for the learner's terminal. Policy rejections,
//! timeouts, non-zero exits and runtime failures are output, not errors.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::filter::{Verdict, check};
use crate::core::policy::CommandPolicy;
use crate::core::types::EnvironmentHandle;
use crate::io::config::ExecConfig;
use crate::io::runtime::{ExecOutput, RuntimeClient};

/// Bounded-latency command runner.
pub struct ExecutionPipeline {
    runtime: Arc<dyn RuntimeClient>,
    policy: CommandPolicy,
    shell: Vec<String>,
    timeout: Duration,
}

impl ExecutionPipeline {
    pub fn new(runtime: Arc<dyn RuntimeClient>, policy: CommandPolicy, exec: &ExecConfig) -> Self {
        Self {
            runtime,
            policy,
            shell: exec.shell.clone(),
            timeout: exec.timeout(),
        }
    }

    /// Filter `command` and, if allowed, run it in `env`.
    #[instrument(skip_all, fields(env = %env.name))]
    pub fn run(&self, command: &str, env: &EnvironmentHandle) -> String {
        if let Verdict::Rejected(rejection) = check(&self.policy, command) {
            debug!(reason = %rejection, "command rejected by sandbox filter");
            return rejection.to_string();
        }

        let argv = self.shell_invocation(command.trim());
        match self.runtime.exec(&env.name, &argv, self.timeout) {
            Ok(output) => render_output(&output, self.timeout),
            Err(err) => {
                warn!(err = %err, "exec failed before the command ran");
                format!("environment unavailable: {err}")
            }
        }
    }

    fn shell_invocation(&self, command: &str) -> Vec<String> {
        let mut argv = self.shell.clone();
        argv.push(command.to_string());
        argv
    }
}

/// Terminal text for a finished (or timed out) execution.
pub fn render_output(output: &ExecOutput, timeout: Duration) -> String {
    if output.success() {
        return if output.stdout.is_empty() {
            output.stderr.clone()
        } else {
            output.stdout.clone()
        };
    }
    if !output.stderr.is_empty() {
        return output.stderr.clone();
    }
    if output.timed_out {
        return format!("command timed out after {}ms", timeout.as_millis());
    }
    match output.exit_code {
        Some(code) => format!("command failed with exit code {code}"),
        None => "command terminated by signal".to_string(),
    }
}

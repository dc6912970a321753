//! Engine configuration stored in `engine.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::naming::is_valid_prefix;
use crate::core::policy::CommandPolicy;
use crate::io::atomic_file::write_atomic;

/// Engine configuration (TOML).
///
/// Edited by hand; every missing field takes its default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Lesson catalog file (`[[lessons]]` TOML).
    pub catalog_path: PathBuf,

    /// Directory holding `progress.json` and `learners.json`.
    pub state_dir: PathBuf,

    pub runtime: RuntimeConfig,

    pub exec: ExecConfig,

    pub policy: CommandPolicy,
}

/// How learner environments are provisioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI binary.
    pub binary: String,
    /// Image every learner environment is created from.
    pub image: String,
    pub restart_policy: String,
    /// Keeps an environment alive indefinitely.
    pub placeholder_command: Vec<String>,
    /// Environment name = prefix + learner id.
    pub name_prefix: String,
    /// Budget for list/inspect/create/start/remove calls.
    pub control_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            image: "linux-learning".to_string(),
            restart_policy: "unless-stopped".to_string(),
            placeholder_command: vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ],
            name_prefix: "linux_user_".to_string(),
            control_timeout_secs: 30,
        }
    }
}

/// How learner commands are executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecConfig {
    /// Interactive-shell wrapper; the learner command is appended as one argument.
    pub shell: Vec<String>,
    /// Hard wall-clock limit per command.
    pub timeout_ms: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: vec!["bash".to_string(), "-lc".to_string()],
            timeout_ms: 3_000,
            output_limit_bytes: 64 * 1024,
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("lessons.toml"),
            state_dir: PathBuf::from(".engine"),
            runtime: RuntimeConfig::default(),
            exec: ExecConfig::default(),
            policy: CommandPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runtime.binary.trim().is_empty() {
            return Err(anyhow!("runtime.binary must be non-empty"));
        }
        if self.runtime.image.trim().is_empty() {
            return Err(anyhow!("runtime.image must be non-empty"));
        }
        if !is_valid_prefix(&self.runtime.name_prefix) {
            return Err(anyhow!(
                "runtime.name_prefix '{}' is not a valid container name prefix",
                self.runtime.name_prefix
            ));
        }
        if self.runtime.placeholder_command.is_empty() {
            return Err(anyhow!("runtime.placeholder_command must be a non-empty array"));
        }
        if self.runtime.control_timeout_secs == 0 {
            return Err(anyhow!("runtime.control_timeout_secs must be > 0"));
        }
        if self.exec.shell.is_empty() || self.exec.shell[0].trim().is_empty() {
            return Err(anyhow!("exec.shell must be a non-empty array"));
        }
        if self.exec.timeout_ms == 0 {
            return Err(anyhow!("exec.timeout_ms must be > 0"));
        }
        if self.exec.output_limit_bytes == 0 {
            return Err(anyhow!("exec.output_limit_bytes must be > 0"));
        }
        self.policy.validate().map_err(|err| anyhow!(err))?;
        Ok(())
    }

    /// Resolve relative paths against the directory holding the config file.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.catalog_path.is_relative() {
            self.catalog_path = base.join(&self.catalog_path);
        }
        if self.state_dir.is_relative() {
            self.state_dir = base.join(&self.state_dir);
        }
        self
    }

    pub fn progress_path(&self) -> PathBuf {
        self.state_dir.join("progress.json")
    }

    pub fn learners_path(&self) -> PathBuf {
        self.state_dir.join("learners.json")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

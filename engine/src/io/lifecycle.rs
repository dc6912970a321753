//! Container lifecycle manager: exactly one running environment per learner.
//!
//! `ensure` sits on the hot path of every command, so the common case (already
//! running) costs one list and one inspect call and never restarts anything.
//! No lock is held across runtime calls; concurrent `ensure` calls for the same
//! learner de-duplicate through the runtime's name-conflict error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::naming::environment_name;
use crate::core::types::{EnvState, EnvironmentHandle, LearnerId};
use crate::io::config::RuntimeConfig;
use crate::io::runtime::{CreateSpec, RuntimeClient, RuntimeError};

/// Lifecycle step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    List,
    Inspect,
    Create,
    Start,
    Remove,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::List => "list",
            Stage::Inspect => "inspect",
            Stage::Create => "create",
            Stage::Start => "start",
            Stage::Remove => "remove",
        };
        f.write_str(label)
    }
}

/// The runtime could not provide a running environment.
#[derive(Debug, Clone, Error)]
#[error("could not provision environment {name} for learner {learner} ({stage}): {source}")]
pub struct ProvisioningError {
    pub learner: LearnerId,
    pub name: String,
    pub stage: Stage,
    #[source]
    pub source: RuntimeError,
}

/// Owns the learner → environment registry.
pub struct LifecycleManager {
    runtime: Arc<dyn RuntimeClient>,
    config: RuntimeConfig,
    /// Last observed handle per learner. Entries are never evicted.
    registry: RwLock<HashMap<LearnerId, EnvironmentHandle>>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn RuntimeClient>, config: RuntimeConfig) -> Self {
        Self {
            runtime,
            config,
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn environment_name(&self, learner: &LearnerId) -> String {
        environment_name(&self.config.name_prefix, learner)
    }

    /// Last handle recorded for `learner`, if any `ensure`/`reset` has run.
    pub fn known(&self, learner: &LearnerId) -> Option<EnvironmentHandle> {
        self.registry
            .read()
            .ok()
            .and_then(|registry| registry.get(learner).cloned())
    }

    /// Number of learners with a recorded environment.
    pub fn known_count(&self) -> usize {
        self.registry.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Guarantee a running environment for `learner` and return its handle.
    #[instrument(skip_all, fields(learner = %learner))]
    pub fn ensure(&self, learner: &LearnerId) -> Result<EnvironmentHandle, ProvisioningError> {
        let name = self.environment_name(learner);
        let fail = |stage, source| ProvisioningError {
            learner: learner.clone(),
            name: name.clone(),
            stage,
            source,
        };

        let existing = self.runtime.list_all().map_err(|e| fail(Stage::List, e))?;
        if existing.iter().any(|n| *n == name) {
            self.start_if_stopped(learner, &name)
        } else {
            self.create(learner, &name)
        }
    }

    /// Destroy the learner's environment (if any) and create a fresh one.
    #[instrument(skip_all, fields(learner = %learner))]
    pub fn reset(&self, learner: &LearnerId) -> Result<EnvironmentHandle, ProvisioningError> {
        let name = self.environment_name(learner);
        info!(name = %name, "resetting environment");
        if let Err(err) = self.runtime.force_remove(&name) {
            debug!(name = %name, err = %err, "remove before reset failed; ignoring");
        }
        self.record(learner, &name, EnvState::Absent);
        self.create(learner, &name)
    }

    fn create(
        &self,
        learner: &LearnerId,
        name: &str,
    ) -> Result<EnvironmentHandle, ProvisioningError> {
        let spec = CreateSpec {
            name: name.to_string(),
            image: self.config.image.clone(),
            restart_policy: self.config.restart_policy.clone(),
            command: self.config.placeholder_command.clone(),
        };
        info!(name, image = %spec.image, "creating environment");
        match self.runtime.create_detached(&spec) {
            Ok(()) => Ok(self.record(learner, name, EnvState::Running)),
            Err(RuntimeError::NameConflict(message)) => {
                // Another request created it first.
                debug!(name, message = %message, "environment appeared concurrently");
                self.start_if_stopped(learner, name)
            }
            Err(source) => Err(ProvisioningError {
                learner: learner.clone(),
                name: name.to_string(),
                stage: Stage::Create,
                source,
            }),
        }
    }

    fn start_if_stopped(
        &self,
        learner: &LearnerId,
        name: &str,
    ) -> Result<EnvironmentHandle, ProvisioningError> {
        let fail = |stage, source| ProvisioningError {
            learner: learner.clone(),
            name: name.to_string(),
            stage,
            source,
        };

        if self
            .runtime
            .is_running(name)
            .map_err(|e| fail(Stage::Inspect, e))?
        {
            debug!(name, "environment already running");
            return Ok(self.record(learner, name, EnvState::Running));
        }

        self.record(learner, name, EnvState::Stopped);
        info!(name, "starting stopped environment");
        self.runtime
            .start(name)
            .map_err(|e| fail(Stage::Start, e))?;
        Ok(self.record(learner, name, EnvState::Running))
    }

    fn record(&self, learner: &LearnerId, name: &str, state: EnvState) -> EnvironmentHandle {
        let handle = EnvironmentHandle {
            name: name.to_string(),
            state,
        };
        match self.registry.write() {
            Ok(mut registry) => {
                registry.insert(learner.clone(), handle.clone());
            }
            Err(_) => warn!(name, "environment registry lock poisoned; not recorded"),
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRuntime, RuntimeCall};

    fn manager(runtime: &Arc<FakeRuntime>) -> LifecycleManager {
        LifecycleManager::new(runtime.clone(), RuntimeConfig::default())
    }

    #[test]
    fn ensure_creates_missing_environment() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(&runtime);

        let handle = lifecycle.ensure(&LearnerId::new("1")).expect("ensure");
        assert_eq!(handle, EnvironmentHandle::running("linux_user_1"));
        assert_eq!(runtime.state("linux_user_1"), Some(EnvState::Running));
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 1);

        let created = runtime.created_specs();
        assert_eq!(created[0].image, "linux-learning");
        assert_eq!(created[0].restart_policy, "unless-stopped");
        assert_eq!(created[0].command, vec!["tail", "-f", "/dev/null"]);
    }

    #[test]
    fn ensure_twice_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(&runtime);
        let learner = LearnerId::new("7");

        let first = lifecycle.ensure(&learner).expect("first");
        runtime.clear_calls();
        let second = lifecycle.ensure(&learner).expect("second");

        assert_eq!(first.name, second.name);
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::List,
                RuntimeCall::Inspect("linux_user_7".to_string())
            ]
        );
    }

    #[test]
    fn ensure_starts_stopped_environment() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert("linux_user_3", EnvState::Stopped);
        let lifecycle = manager(&runtime);

        let handle = lifecycle.ensure(&LearnerId::new("3")).expect("ensure");
        assert_eq!(handle.state, EnvState::Running);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Start(_))), 1);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 0);
    }

    #[test]
    fn name_conflict_during_create_falls_back_to_running_check() {
        let runtime = Arc::new(FakeRuntime::new());
        // Simulates a racing request creating the environment between list and create.
        runtime.appear_on_create("linux_user_5");
        let lifecycle = manager(&runtime);

        let handle = lifecycle.ensure(&LearnerId::new("5")).expect("ensure");
        assert_eq!(handle, EnvironmentHandle::running("linux_user_5"));
        assert_eq!(runtime.environment_count(), 1);
    }

    #[test]
    fn concurrent_ensure_never_duplicates_environment() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = Arc::new(manager(&runtime));
        let learner = LearnerId::new("9");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let learner = learner.clone();
                std::thread::spawn(move || lifecycle.ensure(&learner))
            })
            .collect();
        for handle in handles {
            let env = handle.join().expect("join").expect("ensure");
            assert_eq!(env.name, "linux_user_9");
        }
        assert_eq!(runtime.environment_count(), 1);
    }

    #[test]
    fn unreachable_runtime_is_a_typed_list_failure() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_unreachable(true);
        let lifecycle = manager(&runtime);

        let err = lifecycle.ensure(&LearnerId::new("1")).unwrap_err();
        assert_eq!(err.stage, Stage::List);
        assert!(matches!(err.source, RuntimeError::Unreachable(_)));
        assert!(err.to_string().contains("linux_user_1"));
    }

    #[test]
    fn failed_start_surfaces_start_stage() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert("linux_user_4", EnvState::Stopped);
        runtime.fail_start("no space left on device");
        let lifecycle = manager(&runtime);

        let err = lifecycle.ensure(&LearnerId::new("4")).unwrap_err();
        assert_eq!(err.stage, Stage::Start);
    }

    #[test]
    fn reset_recreates_even_when_absent() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(&runtime);

        let handle = lifecycle.reset(&LearnerId::new("2")).expect("reset");
        assert_eq!(handle.state, EnvState::Running);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Remove(_))), 1);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 1);
    }

    #[test]
    fn reset_replaces_existing_environment() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(&runtime);
        let learner = LearnerId::new("2");
        lifecycle.ensure(&learner).expect("ensure");
        let generation = runtime.generation("linux_user_2");

        lifecycle.reset(&learner).expect("reset");
        assert!(runtime.generation("linux_user_2") > generation);
        assert_eq!(runtime.environment_count(), 1);
        assert_eq!(
            lifecycle.known(&learner).map(|h| h.state),
            Some(EnvState::Running)
        );
    }

    #[test]
    fn registry_keeps_one_entry_per_learner() {
        let runtime = Arc::new(FakeRuntime::new());
        let lifecycle = manager(&runtime);
        lifecycle.ensure(&LearnerId::new("a")).expect("a");
        lifecycle.ensure(&LearnerId::new("a")).expect("a again");
        lifecycle.ensure(&LearnerId::new("b")).expect("b");
        assert_eq!(lifecycle.known_count(), 2);
    }
}

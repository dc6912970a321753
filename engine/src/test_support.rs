//! Test-only helpers: an in-process runtime double and a tempdir workspace.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use crate::core::types::{EnvState, LearnerId, TrackId};
use crate::io::catalog::{Lesson, load_catalog, write_catalog};
use crate::io::config::EngineConfig;
use crate::io::learners::{FileLearnerStore, LearnerRecord, LearnerStore};
use crate::io::progress_store::{FileProgressStore, ProgressStore};
use crate::io::runtime::{CreateSpec, ExecOutput, RuntimeClient, RuntimeError};
use crate::terminal::{TerminalError, TerminalService};

/// Create a deterministic lesson with a generated title.
pub fn lesson(track_id: TrackId, order: i64, check: Option<&str>) -> Lesson {
    Lesson {
        track_id,
        order,
        check: check.map(str::to_string),
        title: format!("lesson {order}"),
        content: None,
    }
}

/// A call observed by [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    List,
    Inspect(String),
    Create(String),
    Start(String),
    Remove(String),
    Exec { name: String, argv: Vec<String> },
}

#[derive(Debug, Default)]
struct FakeState {
    envs: HashMap<String, (EnvState, u64)>,
    next_generation: u64,
    calls: Vec<RuntimeCall>,
    created: Vec<CreateSpec>,
    appear_on_create: Vec<String>,
    unreachable: bool,
    start_failure: Option<String>,
    exec_responses: VecDeque<Result<ExecOutput, RuntimeError>>,
}

impl FakeState {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn guard(&self) -> Result<(), RuntimeError> {
        if self.unreachable {
            Err(RuntimeError::Unreachable("fake runtime is down".to_string()))
        } else {
            Ok(())
        }
    }
}

/// An `exec` parked until the test releases it.
#[derive(Debug, Default)]
struct ExecHold {
    command: Option<String>,
    entered: bool,
    released: bool,
}

/// In-process [`RuntimeClient`] that simulates environment states.
///
/// Every operation runs under one mutex, so `create_detached` is atomic and
/// a second create of the same name fails with a name conflict. A held
/// `exec` waits outside that mutex, so other calls keep going.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    hold: Mutex<ExecHold>,
    hold_changed: Condvar,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake runtime lock")
    }

    pub fn insert(&self, name: &str, state: EnvState) {
        let mut inner = self.lock();
        if state == EnvState::Absent {
            inner.envs.remove(name);
            return;
        }
        let generation = inner.bump();
        inner.envs.insert(name.to_string(), (state, generation));
    }

    pub fn state(&self, name: &str) -> Option<EnvState> {
        self.lock().envs.get(name).map(|(state, _)| *state)
    }

    /// Creation counter of the current environment named `name` (0 if absent).
    pub fn generation(&self, name: &str) -> u64 {
        self.lock().envs.get(name).map_or(0, |(_, g)| *g)
    }

    pub fn environment_count(&self) -> usize {
        self.lock().envs.len()
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn created_specs(&self) -> Vec<CreateSpec> {
        self.lock().created.clone()
    }

    /// Make the next create of `name` lose a race: the environment shows up
    /// running and the create reports a name conflict.
    pub fn appear_on_create(&self, name: &str) {
        self.lock().appear_on_create.push(name.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn fail_start(&self, message: &str) {
        self.lock().start_failure = Some(message.to_string());
    }

    /// Queue the result of the next `exec`. Defaults to an empty success.
    pub fn push_exec(&self, response: Result<ExecOutput, RuntimeError>) {
        self.lock().exec_responses.push_back(response);
    }

    /// Park the next `exec` whose shell command is exactly `command` until
    /// [`FakeRuntime::release_exec`].
    pub fn hold_exec(&self, command: &str) {
        *self.hold.lock().expect("exec hold lock") = ExecHold {
            command: Some(command.to_string()),
            ..ExecHold::default()
        };
    }

    /// Block until the held `exec` has been reached.
    pub fn wait_for_held_exec(&self) {
        let mut hold = self.hold.lock().expect("exec hold lock");
        while !hold.entered {
            hold = self.hold_changed.wait(hold).expect("exec hold wait");
        }
    }

    pub fn release_exec(&self) {
        self.hold.lock().expect("exec hold lock").released = true;
        self.hold_changed.notify_all();
    }

    fn park_if_held(&self, argv: &[String]) {
        let mut hold = self.hold.lock().expect("exec hold lock");
        if hold.entered || hold.command.as_deref() != argv.last().map(String::as_str) {
            return;
        }
        hold.entered = true;
        self.hold_changed.notify_all();
        while !hold.released {
            hold = self.hold_changed.wait(hold).expect("exec hold wait");
        }
    }
}

impl RuntimeClient for FakeRuntime {
    fn list_all(&self) -> Result<Vec<String>, RuntimeError> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::List);
        inner.guard()?;
        let mut names: Vec<String> = inner.envs.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn is_running(&self, name: &str) -> Result<bool, RuntimeError> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::Inspect(name.to_string()));
        inner.guard()?;
        match inner.envs.get(name) {
            Some((state, _)) => Ok(*state == EnvState::Running),
            None => Err(RuntimeError::Failed {
                op: "inspect",
                message: format!("No such object: {name}"),
            }),
        }
    }

    fn create_detached(&self, spec: &CreateSpec) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::Create(spec.name.clone()));
        inner.guard()?;
        if let Some(pos) = inner.appear_on_create.iter().position(|n| *n == spec.name) {
            inner.appear_on_create.remove(pos);
            let generation = inner.bump();
            inner
                .envs
                .insert(spec.name.clone(), (EnvState::Running, generation));
        }
        if inner.envs.contains_key(&spec.name) {
            return Err(RuntimeError::NameConflict(spec.name.clone()));
        }
        let generation = inner.bump();
        inner
            .envs
            .insert(spec.name.clone(), (EnvState::Running, generation));
        inner.created.push(spec.clone());
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::Start(name.to_string()));
        inner.guard()?;
        if let Some(message) = inner.start_failure.clone() {
            return Err(RuntimeError::Failed { op: "start", message });
        }
        match inner.envs.get_mut(name) {
            Some((state, _)) => {
                *state = EnvState::Running;
                Ok(())
            }
            None => Err(RuntimeError::Failed {
                op: "start",
                message: format!("No such container: {name}"),
            }),
        }
    }

    fn force_remove(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::Remove(name.to_string()));
        inner.guard()?;
        match inner.envs.remove(name) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::Failed {
                op: "rm",
                message: format!("No such container: {name}"),
            }),
        }
    }

    fn exec(
        &self,
        name: &str,
        argv: &[String],
        _timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError> {
        self.park_if_held(argv);
        let mut inner = self.lock();
        inner.calls.push(RuntimeCall::Exec {
            name: name.to_string(),
            argv: argv.to_vec(),
        });
        inner.guard()?;
        if inner.envs.get(name).map(|(state, _)| *state) != Some(EnvState::Running) {
            return Err(RuntimeError::Failed {
                op: "exec",
                message: format!("container {name} is not running"),
            });
        }
        inner.exec_responses.pop_front().unwrap_or_else(|| {
            Ok(ExecOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            })
        })
    }
}

/// Temp directory holding a lesson catalog and JSON stores, wired to a
/// [`TerminalService`] over a [`FakeRuntime`].
pub struct TestWorkspace {
    _temp: TempDir,
    config: EngineConfig,
    service: TerminalService,
}

impl TestWorkspace {
    pub fn new(lessons: Vec<Lesson>, runtime: Arc<FakeRuntime>) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let config = EngineConfig::default().resolve_paths(temp.path());
        write_catalog(&config.catalog_path, &lessons)?;
        let catalog = load_catalog(&config.catalog_path)?;
        let service = TerminalService::new(
            runtime,
            &config,
            catalog,
            Box::new(FileProgressStore::new(config.progress_path())),
            Box::new(FileLearnerStore::new(config.learners_path())),
        );
        Ok(Self {
            _temp: temp,
            config,
            service,
        })
    }

    pub fn service(&self) -> &TerminalService {
        &self.service
    }

    pub fn register(&self, id: &str) -> Result<LearnerRecord, TerminalError> {
        self.service.register_learner(&LearnerId::new(id))
    }

    /// Cursor as persisted on disk, bypassing the service.
    pub fn stored_cursor(&self, learner: &str, track: TrackId) -> Option<usize> {
        FileProgressStore::new(self.config.progress_path())
            .get(&LearnerId::new(learner), track)
            .expect("read progress")
    }

    pub fn set_cursor(&self, learner: &str, track: TrackId, cursor: usize) -> Result<()> {
        FileProgressStore::new(self.config.progress_path()).update(
            &LearnerId::new(learner),
            track,
            cursor,
        )
    }

    pub fn learner(&self, id: &str) -> Option<LearnerRecord> {
        FileLearnerStore::new(self.config.learners_path())
            .get(&LearnerId::new(id))
            .expect("read learners")
    }
}

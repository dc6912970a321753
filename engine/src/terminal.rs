//! Orchestration of the caller-facing terminal operations.
//!
//! One request flows: learner lookup → lazy progress record → `ensure` the
//! learner's environment → filter and execute → evaluate the raw input against
//! the current lesson → persist an advanced cursor.
//!
//! The cursor write is a compare-and-set against the cursor read at the start
//! of the request, so a slow request never overwrites a newer advance or a
//! reset.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::naming::is_valid_learner_id;
use crate::core::progress::{CheckOutcome, LessonCheck, advance};
use crate::core::types::{ExecuteOutcome, LearnerId, Progress, TrackId};
use crate::io::catalog::{Lesson, LessonCatalog, TrackLessons, load_catalog};
use crate::io::config::EngineConfig;
use crate::io::learners::{FileLearnerStore, LearnerRecord, LearnerStore};
use crate::io::lifecycle::{LifecycleManager, ProvisioningError};
use crate::io::pipeline::ExecutionPipeline;
use crate::io::progress_store::{FileProgressStore, ProgressStore};
use crate::io::runtime::{DockerRuntime, RuntimeClient};

/// Request-level failures. Everything else degrades to terminal output.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("invalid learner id '{0}'")]
    InvalidLearnerId(String),
    #[error("learner {0} not found")]
    UnknownLearner(LearnerId),
    #[error("no lessons for track {0}")]
    UnknownTrack(TrackId),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl TerminalError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TerminalError::UnknownLearner(_) | TerminalError::UnknownTrack(_)
        )
    }
}

/// Sandboxed execution and progression engine.
pub struct TerminalService {
    lifecycle: LifecycleManager,
    pipeline: ExecutionPipeline,
    catalog: LessonCatalog,
    progress: Box<dyn ProgressStore>,
    learners: Box<dyn LearnerStore>,
}

impl TerminalService {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        config: &EngineConfig,
        catalog: LessonCatalog,
        progress: Box<dyn ProgressStore>,
        learners: Box<dyn LearnerStore>,
    ) -> Self {
        Self {
            lifecycle: LifecycleManager::new(runtime.clone(), config.runtime.clone()),
            pipeline: ExecutionPipeline::new(runtime, config.policy.clone(), &config.exec),
            catalog,
            progress,
            learners,
        }
    }

    /// Docker runtime, catalog from `catalog_path`, JSON stores under `state_dir`.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let runtime = Arc::new(DockerRuntime::new(
            &config.runtime,
            config.exec.output_limit_bytes,
        ));
        let catalog = load_catalog(&config.catalog_path)?;
        Ok(Self::new(
            runtime,
            config,
            catalog,
            Box::new(FileProgressStore::new(config.progress_path())),
            Box::new(FileLearnerStore::new(config.learners_path())),
        ))
    }

    pub fn catalog(&self) -> &LessonCatalog {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn register_learner(&self, learner: &LearnerId) -> Result<LearnerRecord, TerminalError> {
        validate_learner_id(learner)?;
        Ok(self.learners.register(learner)?)
    }

    /// Display payload of a track's lessons, in lesson order.
    pub fn lessons(&self, track: TrackId) -> Result<&[Lesson], TerminalError> {
        Ok(self.track(track)?.lessons())
    }

    /// Run one learner command and advance the lesson cursor on a match.
    #[instrument(skip_all, fields(learner = %learner, track = track))]
    pub fn execute_command(
        &self,
        learner: &LearnerId,
        track: TrackId,
        raw: &str,
    ) -> Result<ExecuteOutcome, TerminalError> {
        let record = self.learner(learner)?;
        let lessons = self.track(track)?;
        let total = lessons.len();
        let input = raw.trim();
        let cursor = self.cursor(learner, track, total)?;

        let env = match self.lifecycle.ensure(learner) {
            Ok(env) => env,
            Err(err) => {
                warn!(err = %err, "environment unavailable; command not executed");
                return Ok(ExecuteOutcome {
                    output: format!("environment unavailable: {err}"),
                    passed: false,
                    progress: Progress {
                        current: cursor,
                        total,
                    },
                });
            }
        };
        self.repair_container_name(&record, &env.name);

        let output = self.pipeline.run(input, &env);

        let transition = advance(cursor, lessons.checks(), input);
        if transition.outcome == Some(CheckOutcome::InvalidPattern)
            && let Some(LessonCheck::Invalid { pattern, error }) =
                transition.lesson.and_then(|i| lessons.checks().get(i))
        {
            warn!(
                lesson = transition.from,
                pattern = %pattern,
                error = %error,
                "lesson check pattern is invalid; attempt treated as not passed"
            );
        }
        if !transition.passed() {
            debug!(cursor = transition.from, outcome = ?transition.outcome, "lesson not passed");
            return Ok(ExecuteOutcome {
                output,
                passed: false,
                progress: Progress {
                    current: transition.to,
                    total,
                },
            });
        }

        if self
            .progress
            .advance(learner, track, transition.from, transition.to)?
        {
            info!(from = transition.from, to = transition.to, "lesson passed");
            return Ok(ExecuteOutcome {
                output,
                passed: true,
                progress: Progress {
                    current: transition.to,
                    total,
                },
            });
        }

        // Another request advanced or reset the cursor while this one ran.
        let current = self.cursor(learner, track, total)?;
        info!(
            from = transition.from,
            current = current,
            "cursor moved during execution; pass not recorded"
        );
        Ok(ExecuteOutcome {
            output,
            passed: false,
            progress: Progress { current, total },
        })
    }

    #[instrument(skip_all, fields(learner = %learner, track = track))]
    pub fn get_progress(
        &self,
        learner: &LearnerId,
        track: TrackId,
    ) -> Result<Progress, TerminalError> {
        self.learner(learner)?;
        let total = self.track(track)?.len();
        let current = self.cursor(learner, track, total)?;
        Ok(Progress { current, total })
    }

    /// Put the cursor back to 0 and give the learner a fresh environment.
    ///
    /// The two steps are not transactional: progress is reset first, so a
    /// provisioning failure leaves a reset cursor with the old environment.
    #[instrument(skip_all, fields(learner = %learner, track = track))]
    pub fn reset_course(&self, learner: &LearnerId, track: TrackId) -> Result<(), TerminalError> {
        let record = self.learner(learner)?;
        self.track(track)?;

        self.progress.update(learner, track, 0)?;
        let env = self.lifecycle.reset(learner)?;
        self.repair_container_name(&record, &env.name);
        info!(env = %env.name, "course reset");
        Ok(())
    }

    fn learner(&self, learner: &LearnerId) -> Result<LearnerRecord, TerminalError> {
        validate_learner_id(learner)?;
        self.learners
            .get(learner)?
            .ok_or_else(|| TerminalError::UnknownLearner(learner.clone()))
    }

    fn track(&self, track: TrackId) -> Result<&TrackLessons, TerminalError> {
        self.catalog
            .track(track)
            .ok_or(TerminalError::UnknownTrack(track))
    }

    /// Stored cursor clamped to `total`, creating the record at 0 on first contact.
    fn cursor(
        &self,
        learner: &LearnerId,
        track: TrackId,
        total: usize,
    ) -> Result<usize, TerminalError> {
        match self.progress.get(learner, track)? {
            Some(cursor) => Ok(cursor.min(total)),
            None => {
                self.progress.create(learner, track)?;
                Ok(0)
            }
        }
    }

    fn repair_container_name(&self, record: &LearnerRecord, name: &str) {
        if record.container_name.as_deref() == Some(name) {
            return;
        }
        if let Err(err) = self.learners.set_container(&record.id, name) {
            warn!(learner = %record.id, err = %err, "could not record container name");
        }
    }
}

fn validate_learner_id(learner: &LearnerId) -> Result<(), TerminalError> {
    if is_valid_learner_id(learner.as_str()) {
        Ok(())
    } else {
        Err(TerminalError::InvalidLearnerId(learner.to_string()))
    }
}

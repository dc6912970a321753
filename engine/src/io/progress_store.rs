//! Progress store: `(learner, track) → current lesson index`.
//!
//! The store is an external collaborator; [`FileProgressStore`] is the default
//! adapter and keeps every record in one JSON document (`progress.json`).

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{LearnerId, TrackId};
use crate::io::atomic_file::write_atomic;

/// Interface the state machine persists through.
pub trait ProgressStore: Send + Sync {
    fn get(&self, learner: &LearnerId, track: TrackId) -> Result<Option<usize>>;
    /// Create a record at index 0. No-op if one exists.
    fn create(&self, learner: &LearnerId, track: TrackId) -> Result<()>;
    /// Set the cursor, creating the record if needed.
    fn update(&self, learner: &LearnerId, track: TrackId, cursor: usize) -> Result<()>;
    /// Move the cursor from `from` to `to` only if it still reads `from`.
    /// A missing record reads as 0. Returns whether the write happened.
    fn advance(
        &self,
        learner: &LearnerId,
        track: TrackId,
        from: usize,
        to: usize,
    ) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub learner_id: LearnerId,
    pub track_id: TrackId,
    pub current_lesson: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressDocument {
    records: Vec<ProgressRecord>,
}

impl ProgressDocument {
    fn find_mut(&mut self, learner: &LearnerId, track: TrackId) -> Option<&mut ProgressRecord> {
        self.records
            .iter_mut()
            .find(|r| r.learner_id == *learner && r.track_id == track)
    }
}

/// JSON-file progress store.
pub struct FileProgressStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("progress store lock poisoned"))
    }

    fn read(&self) -> Result<ProgressDocument> {
        if !self.path.exists() {
            return Ok(ProgressDocument::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read progress {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse progress {}", self.path.display()))
    }

    fn write(&self, mut doc: ProgressDocument) -> Result<()> {
        doc.records.sort_by(|a, b| {
            a.learner_id
                .cmp(&b.learner_id)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        let mut buf = serde_json::to_string_pretty(&doc)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

impl ProgressStore for FileProgressStore {
    fn get(&self, learner: &LearnerId, track: TrackId) -> Result<Option<usize>> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        Ok(doc.find_mut(learner, track).map(|r| r.current_lesson))
    }

    fn create(&self, learner: &LearnerId, track: TrackId) -> Result<()> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        if doc.find_mut(learner, track).is_some() {
            return Ok(());
        }
        debug!(learner = %learner, track, "creating progress record");
        doc.records.push(ProgressRecord {
            learner_id: learner.clone(),
            track_id: track,
            current_lesson: 0,
        });
        self.write(doc)
    }

    fn update(&self, learner: &LearnerId, track: TrackId, cursor: usize) -> Result<()> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        debug!(learner = %learner, track, cursor, "updating progress record");
        match doc.find_mut(learner, track) {
            Some(record) => record.current_lesson = cursor,
            None => doc.records.push(ProgressRecord {
                learner_id: learner.clone(),
                track_id: track,
                current_lesson: cursor,
            }),
        }
        self.write(doc)
    }

    fn advance(
        &self,
        learner: &LearnerId,
        track: TrackId,
        from: usize,
        to: usize,
    ) -> Result<bool> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        let stored = doc.find_mut(learner, track).map(|r| r.current_lesson);
        if stored.unwrap_or(0) != from {
            debug!(
                learner = %learner,
                track,
                from,
                stored = ?stored,
                "progress moved underneath; advance skipped"
            );
            return Ok(false);
        }
        match doc.find_mut(learner, track) {
            Some(record) => record.current_lesson = to,
            None => doc.records.push(ProgressRecord {
                learner_id: learner.clone(),
                track_id: track,
                current_lesson: to,
            }),
        }
        debug!(learner = %learner, track, from, to, "advancing progress record");
        self.write(doc)?;
        Ok(true)
    }
}

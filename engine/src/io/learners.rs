//! Learner directory: which learners exist and their advisory environment name.
//!
//! The stored `container_name` is display data only. The lifecycle manager is
//! the source of truth and the terminal service read-repairs the record after
//! every `ensure`.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::LearnerId;
use crate::io::atomic_file::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerRecord {
    pub id: LearnerId,
    #[serde(default)]
    pub container_name: Option<String>,
}

pub trait LearnerStore: Send + Sync {
    fn get(&self, id: &LearnerId) -> Result<Option<LearnerRecord>>;
    /// Register `id`, returning the existing record if already present.
    fn register(&self, id: &LearnerId) -> Result<LearnerRecord>;
    fn set_container(&self, id: &LearnerId, name: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LearnerDocument {
    learners: Vec<LearnerRecord>,
}

/// JSON-file learner directory (`learners.json`).
pub struct FileLearnerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLearnerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("learner store lock poisoned"))
    }

    fn read(&self) -> Result<LearnerDocument> {
        if !self.path.exists() {
            return Ok(LearnerDocument::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read learners {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse learners {}", self.path.display()))
    }

    fn write(&self, mut doc: LearnerDocument) -> Result<()> {
        doc.learners.sort_by(|a, b| a.id.cmp(&b.id));
        let mut buf = serde_json::to_string_pretty(&doc)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

impl LearnerStore for FileLearnerStore {
    fn get(&self, id: &LearnerId) -> Result<Option<LearnerRecord>> {
        let _guard = self.lock()?;
        let doc = self.read()?;
        Ok(doc.learners.into_iter().find(|l| l.id == *id))
    }

    fn register(&self, id: &LearnerId) -> Result<LearnerRecord> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        if let Some(existing) = doc.learners.iter().find(|l| l.id == *id) {
            return Ok(existing.clone());
        }
        info!(learner = %id, "registering learner");
        let record = LearnerRecord {
            id: id.clone(),
            container_name: None,
        };
        doc.learners.push(record.clone());
        self.write(doc)?;
        Ok(record)
    }

    fn set_container(&self, id: &LearnerId, name: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut doc = self.read()?;
        let record = doc
            .learners
            .iter_mut()
            .find(|l| l.id == *id)
            .ok_or_else(|| anyhow!("learner {id} not found"))?;
        debug!(learner = %id, container = name, "recording container name");
        record.container_name = Some(name.to_string());
        self.write(doc)
    }
}

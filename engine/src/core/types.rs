//! Shared deterministic types for engine core logic.
//!
//! These types define stable contracts between the lifecycle manager, the
//! execution pipeline and the progress state machine. They carry no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a learning track (the catalog groups lessons by track).
pub type TrackId = u32;

/// Opaque learner identifier as issued by the external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnerId(String);

impl LearnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LearnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LearnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle state of an isolated environment as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvState {
    Absent,
    Stopped,
    Running,
}

/// Handle naming one learner's isolated environment.
///
/// The name is derived deterministically from the learner id, so two handles
/// for the same learner always reference the same environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    pub name: String,
    pub state: EnvState,
}

impl EnvironmentHandle {
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: EnvState::Running,
        }
    }
}

/// Cursor position within a track, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Result of one `execute_command` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    /// Text shown in the learner's terminal.
    pub output: String,
    /// Whether this input advanced the lesson cursor.
    pub passed: bool,
    pub progress: Progress,
}

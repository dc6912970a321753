//! Lesson catalog loaded once at startup from `lessons.toml`.
//!
//! ```toml
//! [[lessons]]
//! track_id = 1
//! order = 1
//! title = "Where am I?"
//! check = "^pwd$"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::progress::LessonCheck;
use crate::core::types::TrackId;

/// One catalog lesson. `title` and `content` are display payload only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub track_id: TrackId,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    lessons: Vec<Lesson>,
}

/// Lessons of one track, sorted by `order`, with their compiled checks.
#[derive(Debug, Clone)]
pub struct TrackLessons {
    lessons: Vec<Lesson>,
    checks: Vec<LessonCheck>,
}

impl TrackLessons {
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn checks(&self) -> &[LessonCheck] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

/// Read-only catalog grouped by track.
#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    tracks: BTreeMap<TrackId, TrackLessons>,
}

/// A check pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCheck {
    pub track_id: TrackId,
    pub order: i64,
    pub pattern: String,
    pub error: String,
}

impl LessonCatalog {
    /// Group, sort (stable on ties) and compile.
    pub fn from_lessons(lessons: Vec<Lesson>) -> Self {
        let mut grouped: BTreeMap<TrackId, Vec<Lesson>> = BTreeMap::new();
        for lesson in lessons {
            grouped.entry(lesson.track_id).or_default().push(lesson);
        }

        let tracks = grouped
            .into_iter()
            .map(|(track_id, mut lessons)| {
                lessons.sort_by_key(|lesson| lesson.order);
                let checks = lessons
                    .iter()
                    .map(|lesson| LessonCheck::compile(lesson.check.as_deref()))
                    .collect();
                (track_id, TrackLessons { lessons, checks })
            })
            .collect();

        let catalog = Self { tracks };
        for invalid in catalog.invalid_checks() {
            warn!(
                track_id = invalid.track_id,
                order = invalid.order,
                pattern = %invalid.pattern,
                error = %invalid.error,
                "lesson check does not compile; it will never pass"
            );
        }
        catalog
    }

    pub fn track(&self, track_id: TrackId) -> Option<&TrackLessons> {
        self.tracks.get(&track_id).filter(|track| !track.is_empty())
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.keys().copied()
    }

    pub fn lesson_count(&self, track_id: TrackId) -> usize {
        self.track(track_id).map_or(0, TrackLessons::len)
    }

    /// All checks that failed to compile, in track then lesson order.
    pub fn invalid_checks(&self) -> Vec<InvalidCheck> {
        self.tracks
            .iter()
            .flat_map(|(track_id, track)| {
                track
                    .lessons
                    .iter()
                    .zip(&track.checks)
                    .filter_map(move |(lesson, check)| match check {
                        LessonCheck::Invalid { pattern, error } => Some(InvalidCheck {
                            track_id: *track_id,
                            order: lesson.order,
                            pattern: pattern.clone(),
                            error: error.clone(),
                        }),
                        _ => None,
                    })
            })
            .collect()
    }
}

/// Load the catalog from a TOML file.
pub fn load_catalog(path: &Path) -> Result<LessonCatalog> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read lesson catalog {}", path.display()))?;
    let file: CatalogFile = toml::from_str(&contents)
        .with_context(|| format!("parse lesson catalog {}", path.display()))?;
    let count = file.lessons.len();
    let catalog = LessonCatalog::from_lessons(file.lessons);
    info!(
        path = %path.display(),
        lessons = count,
        tracks = catalog.tracks.len(),
        "lesson catalog loaded"
    );
    Ok(catalog)
}

/// Write lessons as a catalog file.
pub fn write_catalog(path: &Path, lessons: &[Lesson]) -> Result<()> {
    let file = CatalogFile {
        lessons: lessons.to_vec(),
    };
    let mut buf = toml::to_string_pretty(&file).context("serialize lesson catalog")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write lesson catalog {}", path.display()))
}

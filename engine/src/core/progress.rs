//! Lesson progress state machine.
//!
//! Per `(learner, track)` the state is a cursor in `[0, lesson_count]`. The
//! cursor moves forward by one when the raw input satisfies the current
//! lesson's check; `lesson_count` is terminal (free play) until a reset.

use regex::{Regex, RegexBuilder};

/// Compiled success criterion of one lesson.
#[derive(Debug, Clone)]
pub enum LessonCheck {
    /// No criterion: any non-blank input passes.
    Open,
    /// Case-insensitive pattern tested against the raw input.
    Pattern(Regex),
    /// Pattern that failed to compile. Never matches.
    Invalid { pattern: String, error: String },
}

impl LessonCheck {
    /// Compile an optional pattern. Absent and blank patterns are `Open`.
    pub fn compile(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern.filter(|p| !p.trim().is_empty()) else {
            return LessonCheck::Open;
        };
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => LessonCheck::Pattern(regex),
            Err(err) => LessonCheck::Invalid {
                pattern: pattern.to_string(),
                error: err.to_string(),
            },
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, LessonCheck::Invalid { .. })
    }

    /// Evaluate against the raw learner input (not the command output).
    pub fn evaluate(&self, input: &str) -> CheckOutcome {
        if input.trim().is_empty() {
            return CheckOutcome::Blank;
        }
        match self {
            LessonCheck::Open => CheckOutcome::AutoPass,
            LessonCheck::Pattern(regex) if regex.is_match(input) => CheckOutcome::Matched,
            LessonCheck::Pattern(_) => CheckOutcome::NoMatch,
            LessonCheck::Invalid { .. } => CheckOutcome::InvalidPattern,
        }
    }
}

/// Outcome of evaluating a single lesson check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    AutoPass,
    Matched,
    NoMatch,
    /// Input was blank; never advances.
    Blank,
    /// Fail-closed result for a malformed pattern.
    InvalidPattern,
}

impl CheckOutcome {
    pub fn passed(self) -> bool {
        matches!(self, CheckOutcome::AutoPass | CheckOutcome::Matched)
    }
}

/// Cursor transition produced by one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
    /// Index of the lesson that was evaluated, `None` in free play.
    pub lesson: Option<usize>,
    /// `None` in free play (no pattern is evaluated).
    pub outcome: Option<CheckOutcome>,
}

impl Transition {
    pub fn passed(&self) -> bool {
        self.to > self.from
    }
}

/// Apply `input` to the cursor of a track whose lessons compile to `checks`
/// (sorted by lesson order, indexed positionally).
///
/// A stored cursor above `checks.len()` is clamped to the terminal state.
pub fn advance(cursor: usize, checks: &[LessonCheck], input: &str) -> Transition {
    let from = cursor.min(checks.len());
    let Some(check) = checks.get(from) else {
        return Transition {
            from,
            to: from,
            lesson: None,
            outcome: None,
        };
    };

    let outcome = check.evaluate(input);
    let to = if outcome.passed() { from + 1 } else { from };
    Transition {
        from,
        to,
        lesson: Some(from),
        outcome: Some(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checks(patterns: &[Option<&str>]) -> Vec<LessonCheck> {
        patterns.iter().map(|p| LessonCheck::compile(*p)).collect()
    }

    #[test]
    fn single_lesson_requires_argument() {
        let track = checks(&[Some("^mkdir .+")]);

        let t = advance(0, &track, "mkdir");
        assert_eq!(t.to, 0);
        assert_eq!(t.outcome, Some(CheckOutcome::NoMatch));

        let t = advance(0, &track, "mkdir test");
        assert_eq!(t.to, 1);
        assert!(t.passed());
    }

    #[test]
    fn completed_track_is_free_play() {
        let track = checks(&[Some("^mkdir .+")]);
        let t = advance(1, &track, "mkdir again");
        assert_eq!(t.from, 1);
        assert_eq!(t.to, 1);
        assert_eq!(t.outcome, None);
        assert_eq!(t.lesson, None);
        assert!(!t.passed());
    }

    #[test]
    fn matching_is_case_insensitive_and_on_raw_input() {
        let track = checks(&[Some("^pwd$")]);
        assert!(advance(0, &track, "PWD").passed());
        assert!(!advance(0, &track, "pwd -P").passed());
    }

    #[test]
    fn pattern_is_unanchored_unless_written_anchored() {
        let track = checks(&[Some("grep")]);
        assert!(advance(0, &track, "cat notes | grep todo").passed());
    }

    #[test]
    fn lesson_without_check_auto_passes_non_blank_input() {
        let track = checks(&[None, Some("")]);
        let t = advance(0, &track, "anything at all");
        assert_eq!(t.outcome, Some(CheckOutcome::AutoPass));
        assert_eq!(t.to, 1);
        assert!(advance(1, &track, "whoami").passed());
    }

    #[test]
    fn blank_input_never_advances() {
        let track = checks(&[None]);
        let t = advance(0, &track, "   ");
        assert_eq!(t.outcome, Some(CheckOutcome::Blank));
        assert!(!t.passed());
    }

    #[test]
    fn invalid_pattern_fails_closed() {
        let track = checks(&[Some("^ls(")]);
        assert!(track[0].is_invalid());
        let t = advance(0, &track, "ls");
        assert_eq!(t.outcome, Some(CheckOutcome::InvalidPattern));
        assert_eq!(t.to, 0);
    }

    #[test]
    fn two_lesson_track_walks_to_completion() {
        let track = checks(&[Some("^pwd$"), Some(r"^ls(\s.*)?$")]);

        assert!(!advance(0, &track, "ls -la").passed());
        let t = advance(0, &track, "pwd");
        assert_eq!(t.to, 1);
        let t = advance(t.to, &track, "ls");
        assert_eq!(t.to, 2);
        let t = advance(t.to, &track, "pwd");
        assert_eq!(t.to, 2);
        assert!(!t.passed());
    }

    #[test]
    fn stale_cursor_is_clamped_to_terminal() {
        let track = checks(&[None]);
        let t = advance(7, &track, "ls");
        assert_eq!(t.from, 1);
        assert_eq!(t.to, 1);
    }

    #[test]
    fn empty_track_is_immediately_terminal() {
        let t = advance(0, &[], "ls");
        assert_eq!(t.outcome, None);
        assert!(!t.passed());
    }
}

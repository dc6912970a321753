//! Sandbox filter: classify a raw command before it reaches an environment.
//!
//! This is advisory defense-in-depth for the curriculum, not a security
//! boundary. Isolation comes from the container runtime. Deny terms are raw
//! substrings, so `echo dd` trips the `dd` term and `ls && whoami` passes
//! because only pipe stages are split. Both behaviors are kept on purpose:
//! lesson patterns were written against them.

use std::fmt;

use crate::core::policy::CommandPolicy;

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Dangerous { term: String },
    NotAllowed { base: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => f.write_str("empty command."),
            Rejection::Dangerous { .. } => f.write_str("dangerous command."),
            Rejection::NotAllowed { base } => {
                write!(f, "command \"{base}\" is not available in this course.")
            }
        }
    }
}

/// Filter result for one raw command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    /// Learner-facing reason, `None` when allowed.
    pub fn reason(&self) -> Option<String> {
        match self {
            Verdict::Allowed => None,
            Verdict::Rejected(rejection) => Some(rejection.to_string()),
        }
    }
}

/// Check `raw` against `policy`.
///
/// Order: blank input, then deny terms anywhere in the string, then the base
/// command of every non-empty pipe segment against the allow-list.
pub fn check(policy: &CommandPolicy, raw: &str) -> Verdict {
    let command = raw.trim();
    if command.is_empty() {
        return Verdict::Rejected(Rejection::Empty);
    }

    if let Some(term) = policy.denied_term(command) {
        return Verdict::Rejected(Rejection::Dangerous {
            term: term.to_string(),
        });
    }

    for base in stage_bases(command) {
        if !policy.is_allowed_base(base) {
            return Verdict::Rejected(Rejection::NotAllowed {
                base: base.to_string(),
            });
        }
    }

    Verdict::Allowed
}

/// Base command of each non-empty pipe stage, in order.
pub fn stage_bases(command: &str) -> impl Iterator<Item = &str> {
    command
        .split('|')
        .filter_map(|segment| segment.split_whitespace().next())
}

//! Deterministic learner → environment name mapping.

use crate::core::types::LearnerId;

/// Returns true if `id` can be embedded in a container name.
pub fn is_valid_learner_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Returns true if `prefix` is a legal container-name prefix
/// (`[a-zA-Z0-9][a-zA-Z0-9_.-]*`).
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Environment name for `learner`. Total and stable: the same learner always
/// maps to the same name.
pub fn environment_name(prefix: &str, learner: &LearnerId) -> String {
    format!("{prefix}{}", learner.as_str())
}

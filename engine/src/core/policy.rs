//! Command policy data: the allow-list vocabulary and the deny-list terms.
//!
//! The policy is plain data so it can be tuned from `engine.toml` without code
//! changes. Defaults cover the beginner, intermediate and advanced curriculum
//! tracks plus a few utility commands.

use serde::{Deserialize, Serialize};

/// One curriculum tier of permitted base commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowTier {
    pub name: String,
    pub commands: Vec<String>,
}

impl AllowTier {
    fn new(name: &str, commands: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// Sandbox filter policy.
///
/// `deny` terms are matched as raw substrings anywhere in the command and take
/// precedence over `allow`. `allow` is checked against the first token of every
/// pipe segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPolicy {
    pub deny: Vec<String>,
    pub allow: Vec<AllowTier>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            deny: [
                "shutdown",
                "reboot",
                "init 0",
                "mkfs",
                "dd",
                ":(){",
                ">/dev/sda",
                "mv /",
                "rm -rf /",
            ]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
            allow: vec![
                AllowTier::new(
                    "beginner",
                    &[
                        "pwd", "ls", "cd", "mkdir", "touch", "cp", "mv", "rm", "clear", "man",
                    ],
                ),
                AllowTier::new(
                    "intermediate",
                    &[
                        "cat", "less", "head", "tail", "grep", "find", "echo", "wc", "sort",
                    ],
                ),
                AllowTier::new(
                    "advanced",
                    &[
                        "chmod", "chown", "ps", "top", "kill", "tar", "df", "du", "ping", "curl",
                        "wget", "alias",
                    ],
                ),
                AllowTier::new("utility", &["whoami", "date", "history"]),
            ],
        }
    }
}

impl CommandPolicy {
    /// Returns true if `base` appears in any allow tier.
    pub fn is_allowed_base(&self, base: &str) -> bool {
        self.allow
            .iter()
            .any(|tier| tier.commands.iter().any(|c| c == base))
    }

    /// First deny term contained in `command`, if any.
    pub fn denied_term(&self, command: &str) -> Option<&str> {
        self.deny
            .iter()
            .map(String::as_str)
            .find(|term| command.contains(term))
    }

    /// Name of the tier that permits `base`.
    pub fn tier_of(&self, base: &str) -> Option<&str> {
        self.allow
            .iter()
            .find(|tier| tier.commands.iter().any(|c| c == base))
            .map(|tier| tier.name.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.deny.iter().any(|term| term.trim().is_empty()) {
            return Err("policy.deny must not contain blank terms".to_string());
        }
        if self.allow.iter().all(|tier| tier.commands.is_empty()) {
            return Err("policy.allow must permit at least one command".to_string());
        }
        for tier in &self.allow {
            if let Some(bad) = tier
                .commands
                .iter()
                .find(|c| c.is_empty() || c.chars().any(char::is_whitespace))
            {
                return Err(format!(
                    "policy.allow tier '{}' has invalid command '{}'",
                    tier.name, bad
                ));
            }
        }
        Ok(())
    }
}

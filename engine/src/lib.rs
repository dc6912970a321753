//! Sandboxed execution and lesson progression engine.
//!
//! Each learner gets exactly one long-lived isolated environment. Commands are
//! screened by an allow/deny filter, run inside that environment under a hard
//! timeout, and the raw input is checked against the current lesson to move a
//! per-track cursor forward.
//!
//! - **[`core`]**: Pure, deterministic logic (filter, policy, naming, progress).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (container runtime, process
//!   execution, catalog and store files). Behind traits where tests swap them.
//!
//! [`terminal`] composes both into the caller-facing operations.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod terminal;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

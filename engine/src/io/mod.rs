//! Side-effecting adapters: runtime, processes, stores and configuration.

pub mod atomic_file;
pub mod catalog;
pub mod config;
pub mod learners;
pub mod lifecycle;
pub mod pipeline;
pub mod process;
pub mod progress_store;
pub mod runtime;

//! Maru - a YAML-based task runner
//!
//! Maru runs named tasks defined in `tasks.yaml` files. Tasks are made of
//! shell commands, wait conditions and calls into other tasks, and may pull
//! in tasks from local, HTTP, git or OCI includes.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod include;
pub mod runner;

// Re-export commonly used types
pub use error::{MaruError, Result};

/// Current version of Maru
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

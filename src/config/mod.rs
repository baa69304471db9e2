//! Tasks file parsing, validation and host configuration
//!
//! This module handles parsing of tasks.yaml files, validation of their
//! structure, and the settings the host program passes to the runner.

pub mod host;
pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use host::*;
pub use parse::*;
pub use schema::*;
pub use types::*;

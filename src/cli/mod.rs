//! CLI interface and argument parsing
//!
//! This module handles command-line interface parsing, task listing
//! and shell completion.

pub mod app;
pub mod list;

// Re-export main types
pub use app::*;
pub use list::{print_tasks, render_markdown, render_table, ListFormat};

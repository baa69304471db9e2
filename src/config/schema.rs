//! Tasks file validation
//!
//! Structural checks that run before any include is fetched or command runs.

use crate::config::types::TaskFile;
use crate::error::{ConfigError, ConfigResult};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Pattern every declared variable name must match
pub const VARIABLE_NAME_PATTERN: &str = "^[A-Z0-9_]+$";

fn variable_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VARIABLE_NAME_PATTERN).expect("valid variable name regex"))
}

/// Validate a tasks file as written, before include namespacing
pub fn validate_task_file(file: &TaskFile) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for task in &file.tasks {
        validate_task_name(&task.name)?;
        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::DuplicateTask(task.name.clone()));
        }
    }

    for variable in &file.variables {
        validate_variable_name(&variable.name)?;
    }

    file.include_entries()?;

    Ok(())
}

/// Task names may not contain `:`, which is reserved for include namespacing
pub fn validate_task_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() {
        return Err(ConfigError::Invalid("task name cannot be empty".to_string()));
    }
    if name.contains(':') {
        return Err(ConfigError::ReservedTaskName(name.to_string()));
    }
    Ok(())
}

/// Variable names are upper snake case
pub fn validate_variable_name(name: &str) -> ConfigResult<()> {
    if variable_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidVariableName(name.to_string()))
    }
}

/// Split a task reference into its include key and task name
///
/// `build` has no include key, `lib:build` does; more than one `:` is invalid.
pub fn split_task_reference(reference: &str) -> ConfigResult<(Option<&str>, &str)> {
    let mut parts = reference.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => Ok((None, name)),
        (Some(key), Some(name), None) if !key.is_empty() && !name.is_empty() => {
            Ok((Some(key), name))
        }
        _ => Err(ConfigError::InvalidTaskReference(reference.to_string())),
    }
}

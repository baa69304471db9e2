//! Tasks file parsing and discovery

use crate::config::schema::validate_task_file;
use crate::config::types::TaskFile;
use crate::error::{ConfigError, ConfigResult, MaruError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default tasks file names to search for
pub const TASK_FILE_NAMES: &[&str] = &["tasks.yaml", "tasks.yml"];

/// Find the tasks file by searching current and parent directories
pub fn find_task_file() -> ConfigResult<PathBuf> {
    find_task_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("failed to get current directory: {}", e))
    })?)
}

/// Find the tasks file starting from a specific directory
pub fn find_task_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in TASK_FILE_NAMES {
            let candidate = current_dir.join(file_name);
            searched_paths.push(candidate.display().to_string());

            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a tasks file from a path
pub fn parse_task_file(path: &Path) -> Result<TaskFile, MaruError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ConfigError::Invalid(format!("failed to read {}: {}", path.display(), e))
    })?;

    parse_task_file_str(&contents)
}

/// Parse and validate a tasks file from YAML text
pub fn parse_task_file_str(yaml: &str) -> Result<TaskFile, MaruError> {
    let file: TaskFile = serde_yaml::from_str(yaml)?;
    validate_task_file(&file)?;
    Ok(file)
}

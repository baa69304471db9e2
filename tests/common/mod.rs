//! Common test utilities

#![allow(dead_code)]

use assert_cmd::Command;
use maru::config::{parse_task_file, HostConfig};
use maru::runner::Runner;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary directory with a tasks.yaml file
pub fn create_tasks_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let tasks_path = temp_dir.path().join("tasks.yaml");
    fs::write(&tasks_path, content).unwrap();
    (temp_dir, tasks_path)
}

/// Write a file relative to a directory, creating parents
pub fn write_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// The maru binary, run from `dir` with a quiet log filter
pub fn maru(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("maru").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

/// Host configuration with its own env prefix so tests don't collide
pub fn host(prefix: &str) -> HostConfig {
    HostConfig::new().with_env_prefix(prefix)
}

/// A runner for a tasks file on disk, executing in its directory
pub fn runner<'h>(host: &'h HostConfig, tasks_path: &Path) -> Runner<'h> {
    let task_file = parse_task_file(tasks_path).unwrap();
    let location = tasks_path.canonicalize().unwrap();
    let dir = location.parent().unwrap().to_path_buf();
    Runner::new(host, task_file, location.display().to_string())
        .with_working_dir(dir)
        .with_echo(false)
}

/// Read a file written by a task
pub fn read_output(dir: &Path, relative: &str) -> String {
    fs::read_to_string(dir.join(relative)).unwrap()
}

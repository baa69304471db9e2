//! Task registry
//!
//! Every task the runner can reach: the active file's tasks under their own
//! names and included tasks under `key:name`.

use crate::config::types::Task;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry::default()
    }

    /// Register a task; names must be unique
    pub fn add(&mut self, task: Task) -> ConfigResult<()> {
        if self.contains(&task.name) {
            return Err(ConfigError::DuplicateTask(task.name));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Register several tasks in order
    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) -> ConfigResult<()> {
        tasks.into_iter().try_for_each(|task| self.add(task))
    }

    /// Look up a task by name
    pub fn get(&self, name: &str) -> ConfigResult<&Task> {
        self.tasks
            .iter()
            .find(|task| task.name == name)
            .ok_or_else(|| ConfigError::TaskNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|task| task.name == name)
    }

    /// Registered tasks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(name: &str) -> Task {
        Task {
            name: name.to_string(),
            description: None,
            actions: vec![],
            inputs: BTreeMap::new(),
            env_path: None,
        }
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = TaskRegistry::new();
        registry.extend(vec![task("build"), task("lib:build")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("lib:build").unwrap().name, "lib:build");
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.add(task("build")).unwrap();
        assert!(matches!(
            registry.add(task("build")),
            Err(ConfigError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_missing_task_message() {
        let registry = TaskRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "task name nope not found");
    }
}

//! Include resolution
//!
//! Loads task files named in `includes`, namespaces their tasks under the
//! include key and merges them into the task registry.

pub mod fetch;
pub mod git;
pub mod location;
pub mod oci;

pub use fetch::{DefaultFetcher, Fetcher};
pub use location::{is_url, resolve_location};

use crate::config::parse::parse_task_file_str;
use crate::config::types::{ActionKind, IncludeEntry, Task, TaskFile};
use crate::error::{IncludeError, Result};
use crate::runner::interpolate::template_string;
use crate::runner::registry::TaskRegistry;
use crate::runner::variables::VariableStore;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Loads includes and remembers where each key resolved to
pub struct IncludeResolver {
    fetcher: Box<dyn Fetcher>,
    locations: HashMap<String, String>,
}

impl IncludeResolver {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        IncludeResolver {
            fetcher,
            locations: HashMap::new(),
        }
    }

    /// Whether an include key has already been imported
    pub fn is_loaded(&self, key: &str) -> bool {
        self.locations.contains_key(key)
    }

    /// Absolute location an imported key resolved to
    pub fn location_of(&self, key: &str) -> Option<&str> {
        self.locations.get(key).map(String::as_str)
    }

    /// Resolve an include against the current location and parse it
    pub fn load_include(&self, current: &str, include: &str) -> Result<(String, TaskFile)> {
        let absolute = resolve_location(current, include)?;
        let file = self.fetch_task_file(&absolute)?;
        Ok((absolute, file))
    }

    fn fetch_task_file(&self, location: &str) -> Result<TaskFile> {
        let parse_error = |error: String| IncludeError::Parse {
            location: location.to_string(),
            error,
        };

        let bytes = self.fetcher.fetch(location)?;
        let text = String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
        parse_task_file_str(&text).map_err(|e| parse_error(e.to_string()).into())
    }

    /// Import every include entry, recursing into nested includes
    ///
    /// A key seen before is skipped when it resolves to the same location and
    /// rejected when it resolves somewhere else.
    pub fn import_tasks(
        &mut self,
        includes: &[IncludeEntry],
        current: &str,
        registry: &mut TaskRegistry,
        variables: &mut VariableStore,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<()> {
        for include in includes {
            let location = template_string(variables, extra_env, &include.location);
            let absolute = resolve_location(current, &location)?;

            match self.locations.get(&include.key) {
                Some(existing) if *existing == absolute => {
                    debug!(key = %include.key, location = %absolute, "include already imported");
                    continue;
                }
                Some(_) => return Err(IncludeError::Redefined(include.key.clone()).into()),
                None => {}
            }

            debug!(key = %include.key, location = %absolute, "importing include");
            let file = self.fetch_task_file(&absolute)?;
            self.locations.insert(include.key.clone(), absolute.clone());

            let nested = file.include_entries()?;
            registry.extend(namespace_tasks(&include.key, file.tasks))?;
            variables.add_missing_variables(&file.variables)?;

            self.import_tasks(&nested, &absolute, registry, variables, extra_env)?;
        }
        Ok(())
    }
}

/// Prefix task names, and unqualified task references, with `key:`
pub fn namespace_tasks(key: &str, tasks: Vec<Task>) -> Vec<Task> {
    tasks
        .into_iter()
        .map(|mut task| {
            task.name = format!("{}:{}", key, task.name);
            for action in &mut task.actions {
                if let ActionKind::TaskReference(reference) = &mut action.kind {
                    if !reference.name.contains(':') {
                        reference.name = format!("{}:{}", key, reference.name);
                    }
                }
            }
            task
        })
        .collect()
}

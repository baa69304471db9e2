//! Task orchestration
//!
//! The runner resolves the requested task, imports every include it can
//! reach, then executes its actions in order.

use crate::config::host::HostConfig;
use crate::config::schema::split_task_reference;
use crate::config::types::{Action, ActionKind, Task, TaskFile};
use crate::error::{ConfigError, Result};
use crate::include::{DefaultFetcher, Fetcher, IncludeResolver};
use crate::runner::action::{execute_command_action, lower_wait, InputEnv};
use crate::runner::condition::eval_conditional;
use crate::runner::context::Context;
use crate::runner::interpolate::{template_map, template_string};
use crate::runner::registry::TaskRegistry;
use crate::runner::template::{template_action, TemplateContext};
use crate::runner::variables::{Prompter, VariableStore};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runs tasks from a task file
pub struct Runner<'h> {
    host: &'h HostConfig,
    task_file: TaskFile,
    location: String,
    includes: IncludeResolver,
    registry: TaskRegistry,
    ctx: Context,
}

impl<'h> Runner<'h> {
    /// Create a runner for a task file read from `location`
    pub fn new(host: &'h HostConfig, task_file: TaskFile, location: impl Into<String>) -> Self {
        let ctx = Context::new(VariableStore::new(host.env_prefix.clone()))
            .with_max_stack(host.max_stack);
        Runner {
            host,
            task_file,
            location: location.into(),
            includes: IncludeResolver::new(Box::new(DefaultFetcher::new(host))),
            registry: TaskRegistry::new(),
            ctx,
        }
    }

    /// Use a different source for include contents
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.includes = IncludeResolver::new(fetcher);
        self
    }

    /// Use a different prompter for `prompt: true` variables
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        let variables = std::mem::replace(
            &mut self.ctx.variables,
            VariableStore::new(self.host.env_prefix.clone()),
        );
        self.ctx.variables = variables.with_prompter(prompter);
        self
    }

    /// Print commands instead of running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.ctx.dry_run = dry_run;
        self
    }

    /// Echo each command before it runs
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.ctx.echo = echo;
        self
    }

    /// Directory commands run in
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.ctx.working_dir = dir;
        self
    }

    /// Variables as they stand after a run
    pub fn variables(&self) -> &VariableStore {
        &self.ctx.variables
    }

    /// Location of the active task file
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run a task by name with `--set` style presets
    pub fn run(&mut self, task_name: &str, presets: &BTreeMap<String, String>) -> Result<()> {
        let declarations = self.task_file.variables.clone();
        self.ctx.variables.populate_variables(&declarations, presets)?;

        let mut name = task_name.to_string();
        if let (Some(key), subtask) = split_task_reference(task_name)? {
            if let Some(location) = self.task_file.include_location(key).map(str::to_string) {
                name = subtask.to_string();
                self.switch_to_include(&location, presets)?;
            }
        }

        self.registry.extend(self.task_file.tasks.clone())?;

        let task = self.registry.get(&name)?.clone();
        if !task.inputs_have_defaults() {
            return Err(ConfigError::InputsOnDirectCall(task.name).into());
        }

        info!(task = %task.name, "running task");
        self.process_task_references(&task)?;
        self.execute_task(&task, &BTreeMap::new())
    }

    /// Make an included file the active one, keeping root variables
    fn switch_to_include(&mut self, location: &str, presets: &BTreeMap<String, String>) -> Result<()> {
        let location = template_string(&self.ctx.variables, &self.host.extra_env, location);
        let (absolute, mut included) = self.includes.load_include(&self.location, &location)?;
        debug!(location = %absolute, "switching to included task file");

        let mut merged = self.task_file.variables.clone();
        for declaration in included.variables.drain(..) {
            if !merged.iter().any(|existing| existing.name == declaration.name) {
                merged.push(declaration);
            }
        }
        included.variables = merged;

        self.ctx.variables.populate_variables(&included.variables, presets)?;
        self.task_file = included;
        self.location = absolute;
        Ok(())
    }

    /// Import the include behind a key of the active task file, once
    fn import_include_key(&mut self, key: &str) -> Result<()> {
        if self.includes.is_loaded(key) {
            return Ok(());
        }
        let entries: Vec<_> = self
            .task_file
            .include_entries()?
            .into_iter()
            .filter(|entry| entry.key == key)
            .collect();
        self.includes.import_tasks(
            &entries,
            &self.location,
            &mut self.registry,
            &mut self.ctx.variables,
            &self.host.extra_env,
        )
    }

    /// Import every include of the active task file
    pub fn import_all_includes(&mut self) -> Result<()> {
        let entries = self.task_file.include_entries()?;
        self.includes.import_tasks(
            &entries,
            &self.location,
            &mut self.registry,
            &mut self.ctx.variables,
            &self.host.extra_env,
        )
    }

    /// Tasks of the active file, then included tasks when `all` is set
    pub fn list_tasks(&mut self, all: bool) -> Result<Vec<Task>> {
        let declarations = self.task_file.variables.clone();
        self.ctx
            .variables
            .populate_variables(&declarations, &BTreeMap::new())?;

        if self.registry.is_empty() {
            self.registry.extend(self.task_file.tasks.clone())?;
        }
        if all {
            self.import_all_includes()?;
        }
        Ok(self
            .registry
            .iter()
            .filter(|task| all || !task.name.contains(':'))
            .cloned()
            .collect())
    }

    /// Walk the reference graph, importing includes, without running anything
    fn process_task_references(&mut self, task: &Task) -> Result<()> {
        self.ctx.push_task()?;
        let result = self.process_references_of(task);
        self.ctx.pop_task();
        result
    }

    fn process_references_of(&mut self, task: &Task) -> Result<()> {
        for reference in unique_task_references(&task.actions) {
            if reference.contains("${") {
                debug!(reference = %reference, "skipping templated reference during import");
                continue;
            }
            if let (Some(key), _) = split_task_reference(&reference)? {
                self.import_include_key(key)?;
            }
            let referenced = self.registry.get(&reference)?.clone();
            self.process_task_references(&referenced)?;
        }
        Ok(())
    }

    /// Execute a task's actions with the caller's `with` values
    fn execute_task(&mut self, task: &Task, withs: &BTreeMap<String, String>) -> Result<()> {
        self.ctx.push_task()?;
        debug!(task = %task.name, depth = self.ctx.depth(), "executing task");
        let result = self.execute_actions(task, withs);
        self.ctx.pop_task();
        result
    }

    fn execute_actions(&mut self, task: &Task, withs: &BTreeMap<String, String>) -> Result<()> {
        if let Some(env_path) = task.env_path.as_deref().filter(|path| !path.is_empty()) {
            self.ctx.env_file = Some(self.resolve_env_path(env_path));
        }

        let inputs = InputEnv::new(&task.inputs, withs);

        for action in &task.actions {
            let context = TemplateContext::new(withs, &task.inputs, &self.ctx.variables);
            let action = template_action(action, &context)?;
            if !eval_conditional(action.condition.as_deref(), &context)? {
                info!(action = %action.label(), "skipping, condition not met");
                continue;
            }

            match &action.kind {
                ActionKind::TaskReference(reference) => {
                    let referenced = self.registry.get(&reference.name)?.clone();
                    let withs = template_map(&self.ctx.variables, &self.host.extra_env, &reference.with);
                    validate_actionable_task_call(&referenced, &withs)?;
                    self.execute_task(&referenced, &withs)?;
                }
                ActionKind::Command(command) => {
                    execute_command_action(&action.label(), command, &inputs, &mut self.ctx, self.host)?;
                }
                ActionKind::Wait(wait) => {
                    let command = lower_wait(wait, self.host);
                    let label = action.command_label(&command.cmd);
                    execute_command_action(&label, &command, &inputs, &mut self.ctx, self.host)?;
                }
            }
        }
        Ok(())
    }

    /// Env files are relative to the directory of the active task file
    fn resolve_env_path(&self, env_path: &str) -> PathBuf {
        let path = Path::new(env_path);
        if path.is_absolute() || crate::include::is_url(&self.location) {
            return self.ctx.working_dir.join(path);
        }
        Path::new(&self.location)
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

/// Distinct task references of an action list, first occurrence wins
fn unique_task_references(actions: &[Action]) -> Vec<String> {
    let mut seen = HashSet::new();
    actions
        .iter()
        .filter_map(Action::task_reference)
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Check a `with` map against the inputs the task declares
///
/// Unknown and deprecated inputs only warn; missing required inputs fail.
pub fn validate_actionable_task_call(task: &Task, withs: &BTreeMap<String, String>) -> Result<()> {
    for (name, value) in withs {
        match task.inputs.get(name) {
            None => warn!("Task {} does not have an input named {}", task.name, name),
            Some(input) => {
                if let Some(message) = input.deprecated_message.as_deref() {
                    if !value.is_empty() {
                        warn!("This input has been marked deprecated: {}", message);
                    }
                }
            }
        }
    }

    let missing: Vec<&str> = task
        .inputs
        .iter()
        .filter(|(name, input)| {
            input.required
                && input.default.is_empty()
                && withs.get(*name).map_or(true, String::is_empty)
        })
        .map(|(name, _)| name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingInputs {
            task: task.name.clone(),
            inputs: missing.join(", "),
        }
        .into())
    }
}

/// Run a task from a task file with default host wiring
pub fn run(
    host: &HostConfig,
    task_file: TaskFile,
    location: &str,
    task_name: &str,
    presets: &BTreeMap<String, String>,
) -> Result<()> {
    Runner::new(host, task_file, location).run(task_name, presets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_task_file_str;
    use crate::config::types::InputParameter;
    use crate::error::{ExecutionError, MaruError};

    fn task_with_inputs(inputs: &[(&str, bool, &str)]) -> Task {
        Task {
            name: "callee".to_string(),
            description: None,
            actions: vec![],
            inputs: inputs
                .iter()
                .map(|(name, required, default)| {
                    (
                        name.to_string(),
                        InputParameter {
                            required: *required,
                            default: default.to_string(),
                            ..InputParameter::default()
                        },
                    )
                })
                .collect(),
            env_path: None,
        }
    }

    fn withs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_required_inputs() {
        let task = task_with_inputs(&[("input1", true, ""), ("input2", true, ""), ("opt", false, "")]);
        let err = validate_actionable_task_call(&task, &withs(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "task callee is missing required inputs: input1, input2"
        );
        assert!(validate_actionable_task_call(
            &task,
            &withs(&[("input1", "a"), ("input2", "b")])
        )
        .is_ok());
    }

    #[test]
    fn test_required_input_with_default_is_satisfied() {
        let task = task_with_inputs(&[("input1", true, "fallback")]);
        assert!(validate_actionable_task_call(&task, &withs(&[])).is_ok());
    }

    #[test]
    fn test_unknown_inputs_only_warn() {
        let task = task_with_inputs(&[]);
        assert!(validate_actionable_task_call(&task, &withs(&[("extra", "x")])).is_ok());
    }

    #[test]
    fn test_unique_task_references() {
        let task: Task = serde_yaml::from_str(
            "name: t\nactions:\n  - task: a\n  - cmd: echo\n  - task: b\n  - task: a\n",
        )
        .unwrap();
        assert_eq!(unique_task_references(&task.actions), vec!["a", "b"]);
    }

    #[test]
    fn test_direct_call_with_required_inputs_is_rejected() {
        let file = parse_task_file_str(
            "tasks:\n  - name: needs\n    inputs:\n      value:\n        required: true\n    actions:\n      - cmd: echo ${{ inputs.value }}\n",
        )
        .unwrap();
        let host = HostConfig::new();
        let err = Runner::new(&host, file, "/work/tasks.yaml")
            .run("needs", &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "task 'needs' contains 'inputs' and cannot be called directly by the CLI"
        );
    }

    #[test]
    fn test_self_reference_hits_depth_bound() {
        let file = parse_task_file_str(
            "tasks:\n  - name: loop\n    actions:\n      - task: loop\n",
        )
        .unwrap();
        let host = HostConfig::new().with_max_stack(16);
        let err = Runner::new(&host, file, "/work/tasks.yaml")
            .run("loop", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            MaruError::Execution(ExecutionError::TaskStackExceeded(16))
        ));
    }

    #[test]
    fn test_unknown_task() {
        let file = parse_task_file_str("tasks: []\n").unwrap();
        let host = HostConfig::new();
        let err = Runner::new(&host, file, "/work/tasks.yaml")
            .run("absent", &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "task name absent not found");
    }

    #[test]
    fn test_invalid_reference_syntax() {
        let file = parse_task_file_str("tasks: []\n").unwrap();
        let host = HostConfig::new();
        let err = Runner::new(&host, file, "/work/tasks.yaml")
            .run("a:b:c", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            MaruError::Config(ConfigError::InvalidTaskReference(_))
        ));
    }
}

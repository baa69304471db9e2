//! Execution context for task running
//!
//! The context tracks the mutable state shared by every action of a run.

use crate::config::host::DEFAULT_MAX_STACK;
use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::variables::VariableStore;
use std::env;
use std::path::PathBuf;

/// Execution context that tracks state during task execution
pub struct Context {
    /// Directory commands run in unless an action sets `dir`
    pub working_dir: PathBuf,

    /// Variables visible to templating and the command environment
    pub variables: VariableStore,

    /// Env file of the most recent task that declared `envPath`
    pub env_file: Option<PathBuf>,

    /// Print commands instead of running them
    pub dry_run: bool,

    /// Echo each command before it runs
    pub echo: bool,

    depth: usize,
    max_stack: usize,
}

impl Context {
    /// Create a new context around a variable store
    pub fn new(variables: VariableStore) -> Self {
        Context {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            variables,
            env_file: None,
            dry_run: false,
            echo: true,
            depth: 0,
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Set the maximum depth of nested task references
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Enable or disable dry run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable the command echo line
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Enter a task, failing once the stack bound is exceeded
    pub fn push_task(&mut self) -> ExecutionResult<()> {
        if self.depth >= self.max_stack {
            return Err(ExecutionError::TaskStackExceeded(self.max_stack));
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a task
    pub fn pop_task(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }
}

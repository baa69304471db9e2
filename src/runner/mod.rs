//! Task execution engine
//!
//! This module handles the execution of tasks: variable resolution,
//! templating, the action executor and task orchestration.

pub mod action;
pub mod command;
pub mod condition;
pub mod context;
pub mod interpolate;
pub mod registry;
pub mod task;
pub mod template;
pub mod variables;

// Re-export main types
pub use action::{execute_command_action, input_env_name, lower_wait, InputEnv};
pub use command::{run_command, CommandOutput, ShellCommand};
pub use condition::eval_conditional;
pub use context::Context;
pub use interpolate::{template_list, template_map, template_string};
pub use registry::TaskRegistry;
pub use task::{run, validate_actionable_task_call, Runner};
pub use template::{template_action, TemplateContext};
pub use variables::{
    normalize_variable_name, NoPrompt, Prompter, SetVariable, SetVariableMap, TerminalPrompter,
    VariableStore,
};

//! Variable store
//!
//! Holds the resolved value of every variable visible to templating, along
//! with its validation pattern and metadata.

use crate::config::types::VariableDeclaration;
use crate::error::{VariableError, VariableResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::debug;

/// A variable that has been given a value during this run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetVariable {
    pub name: String,
    pub value: String,
    pub pattern: Option<String>,
    pub sensitive: bool,
    /// Host-specific metadata carried alongside the value
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Map of variable names to their set values
pub type SetVariableMap = BTreeMap<String, SetVariable>;

/// Source of interactive variable values
pub trait Prompter {
    /// Ask for a value; `None` keeps the current (default) value
    fn prompt(&self, variable: &VariableDeclaration) -> VariableResult<Option<String>>;
}

/// Prompter for non-interactive runs; never changes a value
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt(&self, _variable: &VariableDeclaration) -> VariableResult<Option<String>> {
        Ok(None)
    }
}

/// Prompter that reads a line from the terminal
///
/// Falls back to the default when stdin is not a terminal or the answer is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, variable: &VariableDeclaration) -> VariableResult<Option<String>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }

        let prompt_error = |e: io::Error| VariableError::Prompt {
            name: variable.name.clone(),
            error: e.to_string(),
        };

        let mut stderr = io::stderr();
        let label = variable.description.as_deref().unwrap_or(&variable.name);
        if variable.default.is_empty() || variable.sensitive {
            write!(stderr, "{}: ", label).map_err(prompt_error)?;
        } else {
            write!(stderr, "{} [{}]: ", label, variable.default).map_err(prompt_error)?;
        }
        stderr.flush().map_err(prompt_error)?;

        let mut answer = String::new();
        stdin.lock().read_line(&mut answer).map_err(prompt_error)?;
        let answer = answer.trim_end_matches(['\r', '\n']);
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(answer.to_string()))
        }
    }
}

/// Active mapping of variable name to resolved value
pub struct VariableStore {
    variables: SetVariableMap,
    env_prefix: String,
    prompter: Box<dyn Prompter>,
}

impl VariableStore {
    /// Create an empty store reading `<env_prefix>_<NAME>` fallbacks
    pub fn new(env_prefix: impl Into<String>) -> Self {
        VariableStore {
            variables: SetVariableMap::new(),
            env_prefix: env_prefix.into().to_uppercase(),
            prompter: Box::new(NoPrompt),
        }
    }

    /// Use a different prompter for `prompt: true` declarations
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Populate the store from presets and declarations
    ///
    /// Presets (`--set KEY=value`) are set first, unvalidated. Each declaration
    /// then resolves as preset > `<PREFIX>_<NAME>` env var > default, with a
    /// prompt overriding the default, and is checked against its pattern.
    pub fn populate_variables(
        &mut self,
        declarations: &[VariableDeclaration],
        presets: &BTreeMap<String, String>,
    ) -> VariableResult<()> {
        for (name, value) in presets {
            self.set_variable(
                &normalize_variable_name(name),
                value,
                None,
                false,
                BTreeMap::new(),
            );
        }

        for declaration in declarations {
            if let Some(existing) = self.variables.get_mut(&declaration.name) {
                if declaration.pattern.is_some() {
                    existing.pattern = declaration.pattern.clone();
                }
                existing.sensitive = existing.sensitive || declaration.sensitive;
                for (key, value) in &declaration.extra {
                    existing.extra.insert(key.clone(), value.clone());
                }
                if existing.value.is_empty() && !declaration.default.is_empty() {
                    existing.value = declaration.default.clone();
                }
                self.check_variable_pattern(&declaration.name)?;
                continue;
            }

            self.declare(declaration)?;
        }

        Ok(())
    }

    /// Add declarations from an included file, skipping names already present
    pub fn add_missing_variables(
        &mut self,
        declarations: &[VariableDeclaration],
    ) -> VariableResult<()> {
        for declaration in declarations {
            if !self.variables.contains_key(&declaration.name) {
                self.declare(declaration)?;
            }
        }
        Ok(())
    }

    fn declare(&mut self, declaration: &VariableDeclaration) -> VariableResult<()> {
        let from_env = env::var(format!("{}_{}", self.env_prefix, declaration.name))
            .ok()
            .filter(|value| !value.is_empty());

        let value = match from_env {
            Some(value) => value,
            None if declaration.prompt => self
                .prompter
                .prompt(declaration)?
                .unwrap_or_else(|| declaration.default.clone()),
            None => declaration.default.clone(),
        };

        self.set_variable(
            &declaration.name,
            &value,
            declaration.pattern.clone(),
            declaration.sensitive,
            declaration.extra.clone(),
        );
        self.check_variable_pattern(&declaration.name)
    }

    /// Set a variable, replacing any previous value
    pub fn set_variable(
        &mut self,
        name: &str,
        value: &str,
        pattern: Option<String>,
        sensitive: bool,
        extra: BTreeMap<String, serde_yaml::Value>,
    ) {
        if sensitive {
            debug!(variable = name, "setting sensitive variable");
        } else {
            debug!(variable = name, value, "setting variable");
        }
        self.variables.insert(
            name.to_string(),
            SetVariable {
                name: name.to_string(),
                value: value.to_string(),
                pattern,
                sensitive,
                extra,
            },
        );
    }

    /// Check that a set variable matches its pattern
    pub fn check_variable_pattern(&self, name: &str) -> VariableResult<()> {
        let variable = self
            .variables
            .get(name)
            .ok_or_else(|| VariableError::NotFound(name.to_string()))?;

        let pattern = match variable.pattern.as_deref() {
            Some(pattern) if !pattern.is_empty() => pattern,
            _ => return Ok(()),
        };

        let re = Regex::new(pattern).map_err(|e| VariableError::InvalidPattern {
            name: name.to_string(),
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;

        if re.is_match(&variable.value) {
            Ok(())
        } else {
            Err(VariableError::PatternMismatch {
                name: name.to_string(),
                pattern: pattern.to_string(),
            })
        }
    }

    /// Get a single set variable
    pub fn get_set_variable(&self, name: &str) -> Option<&SetVariable> {
        self.variables.get(name)
    }

    /// Get every set variable
    pub fn get_set_variables(&self) -> &SetVariableMap {
        &self.variables
    }

    /// Whether a variable has been set
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Plain name to value map, used as templating input
    pub fn values(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(name, variable)| (name.clone(), variable.value.clone()))
            .collect()
    }
}

/// Normalize a CLI-supplied name to upper snake case
pub fn normalize_variable_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

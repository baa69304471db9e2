//! Error types for Maru

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Maru operations
pub type Result<T> = std::result::Result<T, MaruError>;

/// Main error type for Maru
#[derive(Error, Debug)]
pub enum MaruError {
    /// Task file resolution and validation errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Include loading errors
    #[error(transparent)]
    Include(#[from] IncludeError),

    /// Variable population and validation errors
    #[error(transparent)]
    Variable(#[from] VariableError),

    /// Structured templating errors
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Action execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Task file resolution errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to find tasks file (searched: {0})")]
    NotFound(String),

    #[error("invalid tasks file: {0}")]
    Invalid(String),

    #[error("found duplicate task definition for \"{0}\"")]
    DuplicateTask(String),

    #[error("invalid task name \"{0}\" (use of \":\" is reserved for included tasks)")]
    ReservedTaskName(String),

    #[error("invalid task name: {0}")]
    InvalidTaskReference(String),

    #[error("task name {0} not found")]
    TaskNotFound(String),

    #[error("invalid variable name \"{0}\" (must match ^[A-Z0-9_]+$)")]
    InvalidVariableName(String),

    #[error("included item {0} must have exactly one key")]
    InvalidInclude(String),

    #[error("task '{0}' contains 'inputs' and cannot be called directly by the CLI")]
    InputsOnDirectCall(String),

    #[error("task {task} is missing required inputs: {inputs}")]
    MissingInputs { task: String, inputs: String },
}

/// Include resolution and fetch errors
#[derive(Error, Debug)]
pub enum IncludeError {
    #[error("task include \"{0}\" attempted to be redefined")]
    Redefined(String),

    #[error("unable to fetch {location}: {error}")]
    Fetch { location: String, error: String },

    #[error("unable to read included file {location}: {error}")]
    Parse { location: String, error: String },

    #[error("invalid include location {location}: {error}")]
    InvalidLocation { location: String, error: String },

    #[error("relative include {include} cannot be resolved from {current}")]
    UnsupportedRelative { current: String, include: String },
}

/// Variable store errors
#[derive(Error, Debug)]
pub enum VariableError {
    #[error("provided value for variable \"{name}\" does not match pattern \"{pattern}\"")]
    PatternMismatch { name: String, pattern: String },

    #[error("invalid pattern \"{pattern}\" for variable \"{name}\": {error}")]
    InvalidPattern {
        name: String,
        pattern: String,
        error: String,
    },

    #[error("variable \"{0}\" was not found in the current variable map")]
    NotFound(String),

    #[error("unable to prompt for variable \"{name}\": {error}")]
    Prompt { name: String, error: String },
}

/// Structured templating errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unable to serialize action: {0}")]
    Serialize(String),

    #[error("{0}")]
    Render(String),

    #[error("unable to render \"{template}\": {error}")]
    Expression { template: String, error: String },

    #[error("templated action is invalid: {0}")]
    Deserialize(String),
}

/// Action execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("unable to start command \"{command}\": {error}")]
    Spawn { command: String, error: String },

    #[error("command exited with code {0:?}")]
    CommandFailed(Option<i32>),

    #[error("command \"{command}\" timed out after {seconds} seconds")]
    TimedOut { command: String, seconds: u64 },

    #[error("command \"{command}\" failed after {retries} retries")]
    RetriesExhausted { command: String, retries: u32 },

    #[error("wait action is missing a cluster or network")]
    InvalidWait,

    #[error("unable to load env file {path}: {error}")]
    EnvFile { path: PathBuf, error: String },

    #[error("task looping exceeded max configured task stack of {0}")]
    TaskStackExceeded(usize),
}

/// Specialized result type for task file resolution
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for include operations
pub type IncludeResult<T> = std::result::Result<T, IncludeError>;

/// Specialized result type for variable operations
pub type VariableResult<T> = std::result::Result<T, VariableError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        TemplateError::Render(err.to_string())
    }
}

impl From<minijinja::Error> for MaruError {
    fn from(err: minijinja::Error) -> Self {
        MaruError::Template(err.into())
    }
}

//! Core task file types
//!
//! This module defines the data structures that represent a tasks.yaml file.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Top-level tasks file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskFile {
    /// Other task files to pull in, each a single `key: location` map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<BTreeMap<String, String>>,

    /// Variable declarations with defaults, patterns and prompts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDeclaration>,

    /// Tasks defined in this file
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A single resolved include directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEntry {
    pub key: String,
    pub location: String,
}

impl TaskFile {
    /// Flatten the `includes` list into key/location pairs, in declaration order
    pub fn include_entries(&self) -> Result<Vec<IncludeEntry>, ConfigError> {
        self.includes.iter().map(include_entry).collect()
    }

    /// Find the location declared for an include key
    pub fn include_location(&self, key: &str) -> Option<&str> {
        self.includes
            .iter()
            .find_map(|include| include.get(key))
            .map(String::as_str)
    }
}

fn include_entry(include: &BTreeMap<String, String>) -> Result<IncludeEntry, ConfigError> {
    let mut entries = include.iter();
    match (entries.next(), entries.next()) {
        (Some((key, location)), None) => Ok(IncludeEntry {
            key: key.clone(),
            location: location.clone(),
        }),
        _ => Err(ConfigError::InvalidInclude(format!("{:?}", include))),
    }
}

/// A task definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Task {
    /// Name of the task, namespaced as `key:name` once included
    pub name: String,

    /// Description shown when listing tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Actions to run, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,

    /// Input parameters supplied through `with` by referencing actions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputParameter>,

    /// Path to a newline-delimited env file, relative to the tasks file
    #[serde(rename = "envPath", default, skip_serializing_if = "Option::is_none")]
    pub env_path: Option<String>,
}

impl Task {
    /// Whether every required input carries a usable default
    pub fn inputs_have_defaults(&self) -> bool {
        self.inputs
            .values()
            .all(|input| !input.required || !input.default.is_empty())
    }
}

/// An input parameter for a task
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InputParameter {
    #[serde(default)]
    pub description: String,

    /// Whether a caller must supply this input
    #[serde(default)]
    pub required: bool,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar",
        skip_serializing_if = "String::is_empty"
    )]
    pub default: String,

    /// Warning printed when a caller supplies this input
    #[serde(
        rename = "deprecatedMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecated_message: Option<String>,
}

/// A variable declaration as written in a tasks file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VariableDeclaration {
    /// Variable name, upper snake case
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar",
        skip_serializing_if = "String::is_empty"
    )]
    pub default: String,

    /// Ask the user for a value interactively
    #[serde(default)]
    pub prompt: bool,

    /// Regex the resolved value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Keep the value out of logs
    #[serde(default)]
    pub sensitive: bool,

    /// Host-specific metadata carried along with the value
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A variable updated from the output of a command action
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OutputVariable {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Shell preference per operating system
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ShellPreference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub darwin: Option<String>,
}

impl ShellPreference {
    /// Shell chosen for the running operating system
    pub fn for_current_os(&self) -> Option<&str> {
        let shell = if cfg!(target_os = "windows") {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.darwin
        } else {
            &self.linux
        };
        shell.as_deref().filter(|s| !s.is_empty())
    }
}

/// One step of a task
///
/// The YAML form is a flat map; exactly one of `cmd`, `wait` or `task`
/// selects the variant.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    /// Shown instead of the command text
    pub description: Option<String>,

    /// Conditional gate (`if:`); the action is skipped unless it renders to `true`
    pub condition: Option<String>,

    pub kind: ActionKind,
}

/// The three kinds of action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Command(CommandAction),
    Wait(WaitAction),
    TaskReference(TaskReference),
}

/// A shell command to run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandAction {
    pub cmd: String,
    /// `KEY=value` entries added to the command environment
    pub env: Vec<String>,
    /// Suppress live output
    pub mute: bool,
    /// Overall deadline across all attempts, 0 for none
    pub max_total_seconds: u64,
    pub max_retries: u32,
    pub dir: Option<String>,
    pub shell: Option<ShellPreference>,
    pub set_variables: Vec<OutputVariable>,
}

/// A wait condition, lowered to a command before running
#[derive(Debug, Clone, PartialEq)]
pub struct WaitAction {
    pub condition: WaitCondition,
    /// Defaults to 300 seconds when unset
    pub max_total_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitCondition {
    Cluster(ClusterWait),
    Network(NetworkWait),
}

/// Wait for a cluster resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClusterWait {
    pub kind: String,
    #[serde(rename = "name")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
}

/// Wait for a network endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NetworkWait {
    pub protocol: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u16,
}

fn is_zero(code: &u16) -> bool {
    *code == 0
}

/// A call into another task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReference {
    pub name: String,
    pub with: BTreeMap<String, String>,
}

impl Action {
    /// Name of the referenced task, if this action calls one
    pub fn task_reference(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::TaskReference(reference) => Some(&reference.name),
            _ => None,
        }
    }

    /// Short label used in progress output and errors
    ///
    /// Wait actions are labelled `wait` here; once lowered they are labelled
    /// with their command through [`Action::command_label`].
    pub fn label(&self) -> String {
        match &self.kind {
            ActionKind::Command(command) => self.command_label(&command.cmd),
            ActionKind::Wait(_) => self.described().unwrap_or("wait").to_string(),
            ActionKind::TaskReference(reference) => self
                .described()
                .unwrap_or(&reference.name)
                .to_string(),
        }
    }

    /// Label for the command this action runs: the description, else the
    /// command text cut to 60 characters
    pub fn command_label(&self, cmd: &str) -> String {
        match self.described() {
            Some(description) => description.to_string(),
            None => truncate(cmd, 60),
        }
    }

    fn described(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.trim();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Flat serde form of an action
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RawAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    cmd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait: Option<RawWait>,

    #[serde(rename = "task", default, skip_serializing_if = "Option::is_none")]
    task_reference: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    with: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mute: Option<bool>,

    #[serde(
        rename = "maxTotalSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    max_total_seconds: Option<u64>,

    #[serde(rename = "maxRetries", default, skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    shell: Option<ShellPreference>,

    #[serde(rename = "setVariables", default, skip_serializing_if = "Vec::is_empty")]
    set_variables: Vec<OutputVariable>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RawWait {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterWait>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<NetworkWait>,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let cmd = raw.cmd.filter(|c| !c.is_empty());
        let task = raw.task_reference.filter(|t| !t.is_empty());

        let kind = match (cmd, raw.wait, task) {
            (Some(cmd), None, None) => ActionKind::Command(CommandAction {
                cmd,
                env: raw.env,
                mute: raw.mute.unwrap_or(false),
                max_total_seconds: raw.max_total_seconds.unwrap_or(0),
                max_retries: raw.max_retries.unwrap_or(0),
                dir: raw.dir,
                shell: raw.shell,
                set_variables: raw.set_variables,
            }),
            (None, Some(wait), None) => {
                let condition = match (wait.cluster, wait.network) {
                    (Some(cluster), None) => WaitCondition::Cluster(cluster),
                    (None, Some(network)) => WaitCondition::Network(network),
                    _ => {
                        return Err(
                            "wait must specify exactly one of cluster or network".to_string()
                        )
                    }
                };
                ActionKind::Wait(WaitAction {
                    condition,
                    max_total_seconds: raw.max_total_seconds,
                })
            }
            (None, None, Some(name)) => ActionKind::TaskReference(TaskReference {
                name,
                with: raw.with,
            }),
            (None, None, None) => {
                return Err("action must specify one of cmd, wait or task".to_string())
            }
            _ => return Err("action must specify only one of cmd, wait or task".to_string()),
        };

        Ok(Action {
            description: raw.description,
            condition: raw.condition,
            kind,
        })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let mut raw = RawAction {
            description: action.description,
            condition: action.condition,
            ..RawAction::default()
        };
        match action.kind {
            ActionKind::Command(command) => {
                raw.cmd = Some(command.cmd);
                raw.env = command.env;
                raw.mute = Some(command.mute);
                raw.max_total_seconds = Some(command.max_total_seconds);
                raw.max_retries = Some(command.max_retries);
                raw.dir = command.dir;
                raw.shell = command.shell;
                raw.set_variables = command.set_variables;
            }
            ActionKind::Wait(wait) => {
                raw.wait = Some(match wait.condition {
                    WaitCondition::Cluster(cluster) => RawWait {
                        cluster: Some(cluster),
                        network: None,
                    },
                    WaitCondition::Network(network) => RawWait {
                        cluster: None,
                        network: Some(network),
                    },
                });
                raw.max_total_seconds = wait.max_total_seconds;
            }
            ActionKind::TaskReference(reference) => {
                raw.task_reference = Some(reference.name);
                raw.with = reference.with;
            }
        }
        raw
    }
}

/// Render a YAML scalar as the string a shell would see
fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;

    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        other => Err(format!("expected a scalar value, found {:?}", other)),
    }
}

/// Custom deserializer accepting any scalar as a string
fn deserialize_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(D::Error::custom)
}

/// Custom deserializer for `with` maps whose values may be any scalar
fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let values = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    values
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|value| (key, value))
                .map_err(D::Error::custom)
        })
        .collect()
}

//! Action executor
//!
//! Lowers wait actions to commands, assembles the command environment and
//! runs the retry loop for a single command action.

use crate::config::host::HostConfig;
use crate::config::types::{CommandAction, InputParameter, WaitAction, WaitCondition};
use crate::error::{ExecutionError, Result};
use crate::runner::command::{interpreter_for, run_command, CommandOutput, ShellCommand};
use crate::runner::context::Context;
use crate::runner::interpolate::template_string;
use crate::runner::variables::normalize_variable_name;
use colored::Colorize;
use regex::Regex;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout applied to wait actions that do not set one
pub const DEFAULT_WAIT_SECONDS: u64 = 300;

/// Environment variable name for a task input
pub fn input_env_name(input: &str) -> String {
    format!("INPUT_{}", normalize_variable_name(input))
}

/// Input values exposed to a command as `INPUT_*` environment variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputEnv {
    /// Defaults for inputs the caller did not supply
    pub defaults: Vec<(String, String)>,
    /// Values supplied through `with`
    pub withs: Vec<(String, String)>,
}

impl InputEnv {
    pub fn new(inputs: &BTreeMap<String, InputParameter>, withs: &BTreeMap<String, String>) -> Self {
        let defaults = inputs
            .iter()
            .filter(|(name, input)| {
                !input.default.is_empty() && withs.get(*name).map_or(true, String::is_empty)
            })
            .map(|(name, input)| (input_env_name(name), input.default.clone()))
            .collect();

        let withs = withs
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (input_env_name(name), value.clone()))
            .collect();

        InputEnv { defaults, withs }
    }
}

/// Synthesize the command a wait action runs
///
/// Waits are always muted and never retried; the wait command polls on its own.
pub fn lower_wait(wait: &WaitAction, host: &HostConfig) -> CommandAction {
    let seconds = wait.max_total_seconds.unwrap_or(DEFAULT_WAIT_SECONDS);

    let cmd = match &wait.condition {
        WaitCondition::Cluster(cluster) => {
            let mut parts = vec![
                host.wait_command.clone(),
                cluster.kind.clone(),
                cluster.identifier.clone(),
            ];
            if !cluster.condition.is_empty() {
                parts.push(cluster.condition.clone());
            }
            if !cluster.namespace.is_empty() {
                parts.push(format!("-n {}", cluster.namespace));
            }
            parts.push(format!("--timeout {}s", seconds));
            parts.join(" ")
        }
        WaitCondition::Network(network) => {
            let protocol = network.protocol.to_lowercase();
            let code = match (network.code, protocol.as_str()) {
                (0, "http") | (0, "https") => Some(200),
                (0, _) => None,
                (code, _) => Some(code),
            };
            let mut parts = vec![host.wait_command.clone(), protocol, network.address.clone()];
            if let Some(code) = code {
                parts.push(code.to_string());
            }
            parts.push(format!("--timeout {}s", seconds));
            parts.join(" ")
        }
    };

    CommandAction {
        cmd,
        mute: true,
        max_total_seconds: seconds,
        max_retries: 0,
        ..CommandAction::default()
    }
}

fn run_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[\s;&|(])\./run\b").expect("valid run prefix regex"))
}

/// Point `./run` invocations at the running executable
pub fn rewrite_run_prefix(cmd: &str) -> String {
    if !cmd.contains("./run") {
        return cmd.to_string();
    }
    let exe = match env::current_exe() {
        Ok(exe) => exe.display().to_string(),
        Err(_) => return cmd.to_string(),
    };
    let exe = if exe.contains(char::is_whitespace) {
        format!("'{}'", exe)
    } else {
        exe
    };
    run_prefix_regex()
        .replace_all(cmd, |caps: &regex::Captures| format!("{}{}", &caps[1], exe))
        .into_owned()
}

/// Parse `KEY=value` entries, skipping anything without `=`
fn parse_env_entries(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn load_env_file(path: &Path) -> std::result::Result<Vec<(String, String)>, ExecutionError> {
    let env_file_error = |error: dotenvy::Error| ExecutionError::EnvFile {
        path: path.to_path_buf(),
        error: error.to_string(),
    };
    dotenvy::from_path_iter(path)
        .map_err(env_file_error)?
        .map(|item| item.map_err(env_file_error))
        .collect()
}

/// Assemble the command environment, later layers winning
///
/// Order: input defaults, action `env` and env file, `with` inputs, the
/// variable store, then the host's extra env.
fn command_env(
    action_env: &[String],
    inputs: &InputEnv,
    ctx: &Context,
    host: &HostConfig,
) -> Result<Vec<(String, String)>> {
    let mut env = Vec::new();
    env.extend(inputs.defaults.iter().cloned());
    env.extend(parse_env_entries(action_env));
    if let Some(env_file) = &ctx.env_file {
        env.extend(load_env_file(env_file)?);
    }
    env.extend(inputs.withs.iter().cloned());
    env.extend(
        ctx.variables
            .get_set_variables()
            .values()
            .map(|variable| (variable.name.clone(), variable.value.clone())),
    );
    env.extend(host.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

/// Run a command action with its retry and deadline policy
pub fn execute_command_action(
    label: &str,
    action: &CommandAction,
    inputs: &InputEnv,
    ctx: &mut Context,
    host: &HostConfig,
) -> Result<()> {
    let cmd = template_string(&ctx.variables, &host.extra_env, &rewrite_run_prefix(&action.cmd));
    let action_env: Vec<String> = action
        .env
        .iter()
        .map(|entry| template_string(&ctx.variables, &host.extra_env, entry))
        .collect();
    let dir = action
        .dir
        .as_deref()
        .filter(|dir| !dir.is_empty())
        .map(|dir| ctx.working_dir.join(template_string(&ctx.variables, &host.extra_env, dir)));

    let interpreter = action
        .shell
        .as_ref()
        .and_then(interpreter_for)
        .unwrap_or_else(|| host.interpreter.clone());

    let command = ShellCommand {
        interpreter,
        script: cmd,
        dir: dir.or_else(|| Some(ctx.working_dir.clone())),
        env: command_env(&action_env, inputs, ctx, host)?,
        mute: action.mute,
    };

    if ctx.dry_run {
        println!("{}", command.script);
        for variable in &action.set_variables {
            if !ctx.variables.contains(&variable.name) {
                ctx.variables.set_variable(
                    &variable.name,
                    "",
                    variable.pattern.clone(),
                    variable.sensitive,
                    variable.extra.clone(),
                );
            }
        }
        return Ok(());
    }

    if ctx.echo && !action.mute {
        eprintln!("{} {}", "[RUN]".cyan().bold(), label);
    }

    let output = run_with_retries(label, action, &command)?;

    let leaks_secret = ctx.variables.get_set_variables().values().any(|variable| {
        variable.sensitive && !variable.value.is_empty() && output.stdout.contains(&variable.value)
    });
    let sensitive = leaks_secret || action.set_variables.iter().any(|variable| variable.sensitive);
    if !action.mute && !sensitive {
        debug!(action = label, stdout = %output.stdout, stderr = %output.stderr, "command output");
    }

    let value = output.stdout.trim();
    for variable in &action.set_variables {
        ctx.variables.set_variable(
            &variable.name,
            value,
            variable.pattern.clone(),
            variable.sensitive,
            variable.extra.clone(),
        );
        ctx.variables.check_variable_pattern(&variable.name)?;
    }

    Ok(())
}

fn run_with_retries(
    label: &str,
    action: &CommandAction,
    command: &ShellCommand,
) -> Result<CommandOutput> {
    let attempts = action.max_retries.saturating_add(1);
    let deadline = (action.max_total_seconds >= 1)
        .then(|| Instant::now().checked_add(Duration::from_secs(action.max_total_seconds)))
        .flatten();

    for attempt in 1..=attempts {
        let timeout = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                Some(deadline - now)
            }
            None => None,
        };

        if attempt > 1 {
            info!(action = label, attempt, attempts, "retrying");
        }

        match run_command(command, timeout) {
            Ok(output) => return Ok(output),
            Err(ExecutionError::TimedOut { .. }) => break,
            Err(error @ ExecutionError::Spawn { .. }) => return Err(error.into()),
            Err(error) => warn!(action = label, attempt, %error, "command failed"),
        }
    }

    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        Err(ExecutionError::TimedOut {
            command: label.to_string(),
            seconds: action.max_total_seconds,
        }
        .into())
    } else {
        Err(ExecutionError::RetriesExhausted {
            command: label.to_string(),
            retries: action.max_retries,
        }
        .into())
    }
}

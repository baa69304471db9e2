//! Main CLI application

use crate::cli::list::{print_tasks, ListFormat};
use crate::config::{find_task_file, parse_task_file, HostConfig};
use crate::runner::{Runner, TerminalPrompter};
use anyhow::{Context as _, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Task run when none is named
pub const DEFAULT_TASK: &str = "default";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("maru")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A YAML-based task runner with local and remote task includes")
        .subcommand_required(false)
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level, overriding --quiet and --verbose")
                .value_parser(LOG_LEVELS)
                .global(true),
        )
        .subcommand(run_command())
        .subcommand(
            Command::new("completion")
                .about("Generate a shell completion script")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(value_parser!(Shell)),
                ),
        )
}

fn run_command() -> Command {
    Command::new("run")
        .about("Run a task from a tasks file")
        .arg(
            Arg::new("task")
                .value_name("TASK")
                .help("Task to run, `include:task` for an included one")
                .default_value(DEFAULT_TASK),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to the tasks file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("KEY=value")
                .help("Set a variable, may be repeated")
                .action(ArgAction::Append)
                .value_parser(parse_key_val),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print commands instead of running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List the tasks in the tasks file")
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("table")
                .value_parser(["table", "md"]),
        )
        .arg(
            Arg::new("list-all")
                .long("list-all")
                .help("List the tasks in the tasks file and its includes")
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("table")
                .value_parser(["table", "md"])
                .conflicts_with("list"),
        )
}

/// Parse a `KEY=value` pair
fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=value, got \"{}\"", raw)),
    }
}

/// Log filter implied by the verbosity flags
fn log_level(matches: &ArgMatches) -> &str {
    if let Some(level) = matches.get_one::<String>("log-level") {
        level
    } else if matches.get_flag("silent") {
        "off"
    } else if matches.get_flag("quiet") {
        "error"
    } else if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,maru={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    run_from(std::env::args_os())
}

/// Run the CLI application with explicit arguments
pub fn run_from<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut command = build_command();
    let matches = command.clone().get_matches_from(args);
    init_logging(log_level(&matches));

    match matches.subcommand() {
        Some(("run", run_matches)) => run_tasks(&matches, run_matches),
        Some(("completion", completion_matches)) => {
            if let Some(shell) = completion_matches.get_one::<Shell>("shell") {
                clap_complete::generate(*shell, &mut command, "maru", &mut io::stdout());
            }
            Ok(())
        }
        _ => {
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_tasks(global: &ArgMatches, matches: &ArgMatches) -> Result<()> {
    let path = match matches.get_one::<PathBuf>("file") {
        Some(path) => path.clone(),
        None => find_task_file()?,
    };
    let path = path
        .canonicalize()
        .with_context(|| format!("unable to open tasks file {}", path.display()))?;
    let task_file = parse_task_file(&path)?;

    let host = HostConfig::from_env();
    let quiet = global.get_flag("quiet") || global.get_flag("silent");
    let mut runner = Runner::new(&host, task_file, path.display().to_string())
        .with_prompter(Box::new(TerminalPrompter))
        .with_dry_run(matches.get_flag("dry-run"))
        .with_echo(!quiet);

    let listing = matches
        .get_one::<String>("list")
        .map(|format| (false, format))
        .or_else(|| matches.get_one::<String>("list-all").map(|format| (true, format)));
    if let Some((all, format)) = listing {
        let tasks = runner.list_tasks(all)?;
        print_tasks(&tasks, ListFormat::from_arg(format));
        return Ok(());
    }

    let presets: BTreeMap<String, String> = matches
        .get_many::<(String, String)>("set")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let task = matches
        .get_one::<String>("task")
        .map(String::as_str)
        .unwrap_or(DEFAULT_TASK);
    runner.run(task, &presets)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        build_command().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn test_command_is_valid() {
        build_command().debug_assert();
    }

    #[test]
    fn test_log_level_flags() {
        assert_eq!(log_level(&matches(&["maru"])), "info");
        assert_eq!(log_level(&matches(&["maru", "-v"])), "debug");
        assert_eq!(log_level(&matches(&["maru", "-q"])), "error");
        assert_eq!(log_level(&matches(&["maru", "-s"])), "off");
        assert_eq!(log_level(&matches(&["maru", "-v", "--log-level", "warn"])), "warn");
    }

    #[test]
    fn test_run_arguments() {
        let m = matches(&[
            "maru", "run", "build", "-f", "tasks.yaml", "--set", "FOO=bar", "--set", "X=a=b",
            "--dry-run",
        ]);
        let (_, run) = m.subcommand().unwrap();
        assert_eq!(run.get_one::<String>("task").unwrap(), "build");
        assert_eq!(run.get_one::<PathBuf>("file").unwrap(), &PathBuf::from("tasks.yaml"));
        let sets: Vec<_> = run.get_many::<(String, String)>("set").unwrap().collect();
        assert_eq!(sets[1], &("X".to_string(), "a=b".to_string()));
        assert!(run.get_flag("dry-run"));
    }

    #[test]
    fn test_default_task_name() {
        let m = matches(&["maru", "run"]);
        let (_, run) = m.subcommand().unwrap();
        assert_eq!(run.get_one::<String>("task").unwrap(), DEFAULT_TASK);
    }

    #[test]
    fn test_list_formats() {
        let m = matches(&["maru", "run", "--list"]);
        let (_, run) = m.subcommand().unwrap();
        assert_eq!(run.get_one::<String>("list").unwrap(), "table");

        let m = matches(&["maru", "run", "--list-all=md"]);
        let (_, run) = m.subcommand().unwrap();
        assert_eq!(run.get_one::<String>("list-all").unwrap(), "md");
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("KEY=value").unwrap(),
            ("KEY".to_string(), "value".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=value").is_err());
    }
}

//! Command execution
//!
//! Spawns a single shell command, streaming and capturing its output.

use crate::config::types::ShellPreference;
use crate::error::{ExecutionError, ExecutionResult};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// A fully resolved command ready to spawn
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    /// Interpreter and its arguments, e.g. `["sh", "-c"]`
    pub interpreter: Vec<String>,
    pub script: String,
    pub dir: Option<PathBuf>,
    /// Complete environment, later entries winning
    pub env: Vec<(String, String)>,
    /// Suppress live output
    pub mute: bool,
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Interpreter for a shell preference
///
/// `sh`, `bash` and `zsh` take `-c`; `pwsh` and `powershell` take `-Command`;
/// `cmd` takes `/c`. Other shells are assumed to accept `-c`.
pub fn interpreter_for(shell: &ShellPreference) -> Option<Vec<String>> {
    let shell = shell.for_current_os()?;
    let flag = match shell {
        "pwsh" | "powershell" => "-Command",
        "cmd" => "/c",
        _ => "-c",
    };
    Some(vec![shell.to_string(), flag.to_string()])
}

/// Run a command to completion, killing it if `timeout` elapses
///
/// Output is captured on reader threads. On timeout those threads are left
/// detached, since a grandchild may keep the pipes open.
pub fn run_command(command: &ShellCommand, timeout: Option<Duration>) -> ExecutionResult<CommandOutput> {
    let spawn_error = |e: io::Error| ExecutionError::Spawn {
        command: command.script.clone(),
        error: e.to_string(),
    };

    let (program, args) = command
        .interpreter
        .split_first()
        .ok_or_else(|| ExecutionError::Spawn {
            command: command.script.clone(),
            error: "no interpreter configured".to_string(),
        })?;

    let mut process = StdCommand::new(program);
    process.args(args).arg(&command.script);
    if let Some(dir) = &command.dir {
        process.current_dir(dir);
    }
    process.envs(command.env.iter().map(|(k, v)| (k, v)));
    process.stdin(Stdio::inherit());
    process.stdout(Stdio::piped());
    process.stderr(Stdio::piped());

    debug!(command = %command.script, "spawning");
    let mut child = process.spawn().map_err(spawn_error)?;

    let stdout = child
        .stdout
        .take()
        .map(|pipe| capture(pipe, !command.mute, false));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| capture(pipe, !command.mute, true));

    let status = match timeout {
        Some(timeout) => match child.wait_timeout(timeout).map_err(spawn_error)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionError::TimedOut {
                    command: command.script.clone(),
                    seconds: timeout.as_secs(),
                });
            }
        },
        None => child.wait().map_err(spawn_error)?,
    };

    let output = CommandOutput {
        stdout: stdout.map(join).unwrap_or_default(),
        stderr: stderr.map(join).unwrap_or_default(),
    };

    if status.success() {
        Ok(output)
    } else {
        Err(ExecutionError::CommandFailed(status.code()))
    }
}

fn capture<R>(pipe: R, echo: bool, to_stderr: bool) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut captured = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if echo {
                        if to_stderr {
                            let _ = io::stderr().write_all(&line);
                        } else {
                            let _ = io::stdout().write_all(&line);
                        }
                    }
                    captured.extend_from_slice(&line);
                }
            }
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}

fn join(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

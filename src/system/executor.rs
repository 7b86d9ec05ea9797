// src/system/executor.rs

//! Spawning the analysis tool.

use crate::models::Command;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;

/// Failures to run a command at all. A non-zero exit is not one of them.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The command has no program to run.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The process could not be spawned.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// The process ended without an exit code.
    #[error("Command '{0}' was terminated by a signal.")]
    Terminated(String),
}

/// What a finished (or rehearsed) process left behind.
///
/// Output is streamed to the terminal rather than buffered, so `stdout` and
/// `stderr` are empty for streamed runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i32,
}

impl ProcessOutput {
    /// Whether the process exited with 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Blocking execution of an argument vector.
pub trait ProcessRunner {
    /// Runs `command` with `env` layered over the inherited environment.
    /// When `dry_run` is set the command is only logged and exit code 0 is reported.
    fn run(
        &mut self,
        command: &Command,
        env: &HashMap<String, String>,
        dry_run: bool,
    ) -> Result<ProcessOutput, ExecutionError>;
}

/// Runs commands as child processes of this one, with inherited stdio so the
/// child's output interleaves with our log.
#[derive(Debug, Default)]
pub struct SystemRunner {
    cwd: Option<PathBuf>,
}

impl SystemRunner {
    /// Runs commands from the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every command from `cwd` instead of the current directory.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(
        &mut self,
        command: &Command,
        env: &HashMap<String, String>,
        dry_run: bool,
    ) -> Result<ProcessOutput, ExecutionError> {
        let program = command.program();
        if program.trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        let command_line = command.display_line();

        if dry_run {
            log::info!("Dry run, not executing: {}", command_line);
            return Ok(ProcessOutput::default());
        }

        log::info!("Executing command:\n{}", command_line);
        let mut child_command = StdCommand::new(program);
        child_command
            .args(command.args())
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &self.cwd {
            child_command.current_dir(dunce::simplified(cwd));
        }

        let status = child_command
            .status()
            .map_err(|e| ExecutionError::CommandFailed(command_line.clone(), e))?;

        match status.code() {
            Some(code) => {
                if code != 0 {
                    log::warn!("Command exited with code {}: {}", code, command_line);
                }
                Ok(ProcessOutput {
                    exit_code: code,
                    ..Default::default()
                })
            }
            None => Err(ExecutionError::Terminated(command_line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_reports_success_without_spawning() {
        let mut runner = SystemRunner::new();
        let command = Command::new("definitely-not-a-real-binary-xyz");
        let output = runner.run(&command, &HashMap::new(), true).unwrap();
        assert!(output.success());
    }

    #[test]
    fn test_empty_program_is_rejected() {
        let mut runner = SystemRunner::new();
        let command = Command::new("");
        let result = runner.run(&command, &HashMap::new(), false);
        assert!(matches!(result, Err(ExecutionError::EmptyCommand)));
    }

    #[test]
    fn test_missing_binary_is_an_error_not_a_panic() {
        let mut runner = SystemRunner::new();
        let command = Command::new("definitely-not-a-real-binary-xyz");
        let result = runner.run(&command, &HashMap::new(), false);
        assert!(matches!(result, Err(ExecutionError::CommandFailed(_, _))));
    }

    #[cfg(unix)]
    #[test]
    fn test_commands_run_from_the_configured_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut runner = SystemRunner::with_cwd(dir.path());
        let mut command = Command::new("touch");
        command.extend(["marker"]);

        let output = runner.run(&command, &HashMap::new(), false).unwrap();

        assert!(output.success());
        assert!(dir.path().join("marker").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_codes_are_reported() {
        let mut runner = SystemRunner::new();
        let ok = runner
            .run(&Command::new("true"), &HashMap::new(), false)
            .unwrap();
        assert_eq!(ok.exit_code, 0);

        let failed = runner
            .run(&Command::new("false"), &HashMap::new(), false)
            .unwrap();
        assert_ne!(failed.exit_code, 0);
    }
}

//! Process execution collaborator.
//!
//! Lifecycle code never builds `std::process::Command` itself; it resolves a
//! template into a `ResolvedCommand` and hands it to a `CommandExecutor`.
//! `run_checked` turns a spawn failure or non-zero exit into an
//! `ExecutionFailure` tagged with the action and service type.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Result, StackError};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::template::ResolvedCommand;
use crate::types::Action;

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Output of a command that exited 0 with nothing printed
    pub fn ok() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }
}

pub trait CommandExecutor {
    /// Run the command to completion. `Err` means it could not be run at all.
    fn execute(&self, command: &ResolvedCommand) -> std::io::Result<CommandOutput>;
}

/// Run `command` and require a zero exit status
pub fn run_checked(
    executor: &dyn CommandExecutor,
    command: &ResolvedCommand,
    action: Action,
    service_type: &str,
) -> Result<CommandOutput> {
    let failure = |reason: String| StackError::ExecutionFailure {
        action,
        service_type: service_type.to_string(),
        command: command.redacted(),
        reason,
    };

    let output = executor
        .execute(command)
        .map_err(|e| failure(format!("failed to spawn: {e}")))?;

    if output.success {
        Ok(output)
    } else {
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(failure(format!(
            "exit status {code}: {}",
            output.stderr.trim()
        )))
    }
}

/// Executes commands on the local host.
///
/// Privileged commands are prefixed with `sudo -n` unless stackctl already
/// runs as root.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    root_helper: Vec<String>,
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostExecutor {
    pub fn new() -> Self {
        Self {
            root_helper: vec!["sudo".to_string(), "-n".to_string()],
        }
    }

    /// Override the elevation prefix (e.g. `["doas"]`)
    pub fn with_root_helper(root_helper: Vec<String>) -> Self {
        Self { root_helper }
    }

    fn argv_for(&self, command: &ResolvedCommand) -> Vec<String> {
        let elevate = command.run_as_root() && !nix::unistd::geteuid().is_root();
        let mut argv = Vec::with_capacity(command.argv().len() + self.root_helper.len());
        if elevate {
            argv.extend(self.root_helper.iter().cloned());
        }
        argv.extend(command.argv().iter().cloned());
        argv
    }
}

impl CommandExecutor for HostExecutor {
    fn execute(&self, command: &ResolvedCommand) -> std::io::Result<CommandOutput> {
        let argv = self.argv_for(command);
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command line",
            ));
        };

        info!(command = %command, root = command.run_as_root(), "executing");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group()
            .spawn()?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        let output = child.wait_with_output();
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }
        let output = output?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };
        debug!(exit_code = ?result.exit_code, "command finished");
        Ok(result)
    }
}

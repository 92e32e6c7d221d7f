use crate::error::ShellError;
use crate::shell::Shell;
use crate::types::{CommandOutput, ExecMode, Invocation};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs commands as real child processes.
///
/// Elevation goes through `sudo` on Unix hosts. On Windows the command runs
/// directly and is expected to be launched from an elevated console.
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        invocation: Invocation,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ShellError> {
        let command_line = invocation.command_line();
        tracing::debug!(command = %command_line, "exec");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ShellError::Timeout {
                    command: command_line.clone(),
                    timeout: limit,
                })?,
            None => command.output().await,
        }
        .map_err(|source| ShellError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.success() {
            tracing::debug!(
                command = %command_line,
                status = ?output.status,
                "command exited unsuccessfully"
            );
        }

        Ok(output)
    }
}

#[async_trait]
impl Shell for SystemShell {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ShellError> {
        self.run(Invocation::new(ExecMode::Plain, program, args), None)
            .await
    }

    async fn exec_elevated(
        &self,
        reason: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ShellError> {
        tracing::info!("{}", reason);

        let invocation = if cfg!(windows) {
            Invocation::new(ExecMode::Elevated, program, args)
        } else {
            let mut sudo_args = Vec::with_capacity(args.len() + 1);
            sudo_args.push(program);
            sudo_args.extend_from_slice(args);
            Invocation::new(ExecMode::Elevated, "sudo", &sudo_args)
        };

        self.run(invocation, None).await
    }

    async fn exec_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        self.run(
            Invocation::new(ExecMode::Timed(timeout), program, args),
            Some(timeout),
        )
        .await
    }
}

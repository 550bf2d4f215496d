use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::command::{CommandError, CommandSpec};

/// Abstraction over external CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor: Send + Sync {
    /// Run a command and capture stdout.
    async fn exec(&self, cmd: &CommandSpec) -> Result<String, CommandError>;

    /// Run a command, streaming its output to the terminal.
    async fn exec_streaming(&self, cmd: &CommandSpec) -> Result<(), CommandError>;
}

/// Spawns real processes. Children are killed if the future is dropped.
pub struct RealExecutor;

fn command(cmd: &CommandSpec) -> Command {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .envs(cmd.envs.iter().map(|(k, v)| (k, v)))
        .kill_on_drop(true);
    if let Some(dir) = &cmd.current_dir {
        command.current_dir(dir);
    }
    command
}

fn not_found(cmd: &CommandSpec, source: std::io::Error) -> CommandError {
    CommandError::NotFound {
        program: cmd.program.clone(),
        source,
    }
}

impl CommandExecutor for RealExecutor {
    async fn exec(&self, cmd: &CommandSpec) -> Result<String, CommandError> {
        tracing::debug!(program = %cmd.program, args = ?cmd.args, "exec");

        let mut child = command(cmd)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found(cmd, e))?;

        if let (Some(data), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            let write_err = |e| CommandError::StdinWrite {
                program: cmd.program.clone(),
                source: e,
            };
            stdin.write_all(data).await.map_err(write_err)?;
            stdin.shutdown().await.map_err(write_err)?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| not_found(cmd, e))?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| CommandError::InvalidUtf8 {
                program: cmd.program.clone(),
                source: e,
            })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(CommandError::CommandFailed {
                program: cmd.program.clone(),
                args: cmd.args.clone(),
                stderr,
            })
        }
    }

    async fn exec_streaming(&self, cmd: &CommandSpec) -> Result<(), CommandError> {
        tracing::debug!(program = %cmd.program, args = ?cmd.args, "exec (streaming)");

        let status = command(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| not_found(cmd, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::CommandFailed {
                program: cmd.program.clone(),
                args: cmd.args.clone(),
                stderr: format!("exit code: {status}"),
            })
        }
    }
}

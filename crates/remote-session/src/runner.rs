use crate::command::RemoteCommand;
use crate::error::CommandError;
use crate::shell::RemoteShell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Executes remote commands one at a time and captures their output.
///
/// Two commands issued on the same channel before the first resolves would interleave
/// their output, so every call waits its turn at `gate`. The lock is FIFO: callers
/// are served in the order they arrived.
pub struct CommandRunner {
    shell: Arc<dyn RemoteShell>,
    gate: Mutex<()>,
}

impl CommandRunner {
    pub fn new(shell: Arc<dyn RemoteShell>) -> Self {
        Self { shell, gate: Mutex::new(()) }
    }

    /// Runs `command` and returns its captured stdout.
    ///
    /// A nonzero exit status becomes `CommandError::NonZeroExit` carrying stderr, and a
    /// reported exit signal becomes `CommandError::Signalled`.
    /// No timeout is applied; see [`CommandRunner::run_with_deadline`].
    pub async fn run(&self, command: &RemoteCommand) -> Result<String, CommandError> {
        let _turn = self.gate.lock().await;
        tracing::debug!(command = %command, "Running remote command.");

        let output = self.shell.exec(command.text()).await.inspect_err(|e| {
            tracing::warn!(command = %command, error = %e, "Remote command failed to complete.");
        })?;

        if let Some(signal) = output.exit_signal {
            tracing::debug!(command = %command, %signal, "Remote command was killed by a signal.");
            return Err(CommandError::Signalled { signal, stderr: output.stderr.trim().to_string() });
        }

        match output.exit_status {
            Some(0) | None => Ok(output.stdout),
            Some(code) => {
                tracing::debug!(command = %command, code, "Remote command exited with a nonzero status.");
                Err(CommandError::NonZeroExit { code, stderr: output.stderr.trim().to_string() })
            }
        }
    }

    /// Like [`CommandRunner::run`], but gives up after `deadline`.
    ///
    /// The deadline covers the wait for the gate as well as execution.
    pub async fn run_with_deadline(
        &self,
        command: &RemoteCommand,
        deadline: Duration,
    ) -> Result<String, CommandError> {
        tokio::time::timeout(deadline, self.run(command))
            .await
            .map_err(|_| CommandError::DeadlineExceeded(deadline))?
    }
}

use crate::error::{CommandError, ConnectError};
use async_trait::async_trait;

/// Everything a finished remote command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the channel closed without the server reporting a status.
    pub exit_status: Option<u32>,
    /// Set when the server reports the command was killed by a signal.
    pub exit_signal: Option<String>,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), exit_status: Some(0), ..Self::default() }
    }

    pub fn failure(code: u32, stderr: impl Into<String>) -> Self {
        Self { stderr: stderr.into(), exit_status: Some(code), ..Self::default() }
    }

    pub fn signalled(signal: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self { stderr: stderr.into(), exit_signal: Some(signal.into()), ..Self::default() }
    }
}

/// The "run command, capture output" primitive of a remote host.
///
/// Implementations execute one command per call and return once its channel has
/// closed. They do not serialise callers; `CommandRunner` does.
///
/// `connect` and `disconnect` default to no-ops for shells without a transport.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str) -> Result<ExecOutput, CommandError>;

    async fn connect(&self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn disconnect(&self) {}
}

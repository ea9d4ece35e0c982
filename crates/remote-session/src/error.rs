use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("VPS configuration is missing '{0}'")]
    MissingConfig(&'static str),

    #[error("Failed to load private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    #[error("SSH transport error: {0}")]
    Transport(#[from] russh::Error),

    #[error("Public-key authentication was rejected for user '{0}'")]
    AuthenticationFailed(String),

    #[error("Timed out after {0:?} while connecting to the VPS")]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Remote session is not ready")]
    NotReady,

    #[error("Command channel error: {0}")]
    Channel(String),

    #[error("Remote command exited with status {code}: {stderr}")]
    NonZeroExit { code: u32, stderr: String },

    #[error("Remote command was killed by signal {signal}: {stderr}")]
    Signalled { signal: String, stderr: String },

    #[error("Command aborted because the session was disconnected")]
    Aborted,

    #[error("Command did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl CommandError {
    /// True when the remote end ran the command and reported failure, as opposed to
    /// the transport itself failing.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, CommandError::NonZeroExit { .. } | CommandError::Signalled { .. })
    }
}

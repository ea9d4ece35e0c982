//! # Remote Session Crate
//!
//! Owns the single SSH connection to the VPS and the command plumbing on top of it.
//!
//! - `RemoteSession`: connect/disconnect lifecycle and raw command execution over `russh`.
//! - `RemoteShell`: the "run command, capture output" seam. `RemoteSession` is the
//!   production implementation; tests substitute scripted shells.
//! - `CommandRunner`: serialises every command through one gate so at most one
//!   channel is in flight, and maps exit codes to `CommandError`.
//! - `RemoteCommand`: command text paired with the form that is safe to log.

pub mod command;
pub mod error;
pub mod runner;
pub mod session;
pub mod shell;

pub use command::RemoteCommand;
pub use error::{CommandError, ConnectError};
pub use runner::CommandRunner;
pub use session::{RemoteSession, SessionState};
pub use shell::{ExecOutput, RemoteShell};

use core_types::{CoreError, InstanceState, SlotId};
use remote_session::CommandError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("All {0} instance slots are occupied")]
pub struct NoCapacityError(pub u32);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error(transparent)]
    NoCapacity(#[from] NoCapacityError),

    #[error("Failed to list running instances: {0}")]
    Command(#[from] CommandError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("Container for slot {slot} is not running and could not be started")]
    HostNotReady { slot: SlotId },

    #[error("Terminal in slot {slot} did not report a connection after {attempts} checks")]
    VerificationTimeout { slot: SlotId, attempts: u32 },

    #[error("Slot {slot} cannot be started while {state}")]
    InvalidState { slot: SlotId, state: InstanceState },

    #[error("Remote command failed during start: {0}")]
    Command(#[from] CommandError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopError {
    #[error("Slot {slot} is still starting and cannot be stopped yet")]
    StillStarting { slot: SlotId },

    #[error("Failed to stop terminal in slot {slot}: {source}")]
    Command {
        slot: SlotId,
        #[source]
        source: CommandError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairError {
    #[error("Trading pair must not be empty")]
    EmptyPair,

    #[error("Failed to select {pair} in slot {slot}: {source}")]
    Command {
        slot: SlotId,
        pair: String,
        #[source]
        source: CommandError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No connection details found for user '{0}'")]
    NotFound(String),

    #[error("Secret for user '{user_id}' is not available (expected in ${var})")]
    MissingSecret { user_id: String, var: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid credentials: {0}")]
    Credentials(#[from] CoreError),

    #[error(transparent)]
    Allocation(#[from] AllocError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Stop(#[from] StopError),

    #[error(transparent)]
    Pair(#[from] PairError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl ServiceError {
    /// A short, secret-free explanation suitable for the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::Store(StoreError::NotFound(_)) => "No connection details found",
            ServiceError::Store(StoreError::MissingSecret { .. }) => "Trading credentials are incomplete",
            ServiceError::Credentials(_) => "Invalid MT5 credentials",
            ServiceError::Allocation(AllocError::NoCapacity(_)) => "No available MT5 instances",
            ServiceError::Allocation(AllocError::Command(_)) => "Could not query the VPS",
            ServiceError::Start(StartError::HostNotReady { .. }) => "MT5 instance is not ready",
            ServiceError::Start(StartError::VerificationTimeout { .. }) => {
                "Failed to establish MT5 connection after multiple attempts"
            }
            ServiceError::Start(_) => "Failed to start MT5",
            ServiceError::Stop(StopError::StillStarting { .. }) => "MT5 is still starting",
            ServiceError::Stop(_) => "Failed to stop MT5",
            ServiceError::Pair(PairError::EmptyPair) => "Trading pair must not be empty",
            ServiceError::Pair(_) => "Failed to set trading pair",
            ServiceError::Command(_) => "Could not reach the VPS",
        }
    }
}

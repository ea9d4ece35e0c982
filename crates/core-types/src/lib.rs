pub mod credentials;
pub mod error;
pub mod slot;
pub mod state;

// Re-export the core types to provide a clean public API.
pub use credentials::{InstanceCredentials, Secret, UserConnection};
pub use error::CoreError;
pub use slot::{INSTANCE_PREFIX, MAX_SLOT, MIN_SLOT, SlotId};
pub use state::{ConnectionMonitorState, InstanceState, TradingOutcome};

//! # Orchestrator Crate
//!
//! Runs MT5 trading terminals in numbered Docker containers (`mt5-instance-<n>`) on
//! one VPS, driving everything through the shared `remote-session` runner.
//!
//! - `SlotAllocator`: finds and reserves the lowest free slot.
//! - `InstanceController`: start, stop and release one slot's terminal.
//! - `ConnectionVerifier`: decides from the process list and today's log whether a
//!   terminal is logged in, with bounded retries.
//! - `ConnectionMonitor`: periodic background re-checks of tracked connections.
//! - `TradingService`: the `start_trading(user_id)` facade used by the API and CLI.

pub mod allocator;
pub mod commands;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod retry;
pub mod service;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use allocator::{SlotAllocator, SlotClaim};
pub use controller::{ControllerTimings, InstanceController};
pub use credentials::{ConfigCredentialStore, CredentialStore};
pub use error::{AllocError, NoCapacityError, PairError, ServiceError, StartError, StopError, StoreError};
pub use monitor::ConnectionMonitor;
pub use registry::ConnectionRegistry;
pub use retry::{Backoff, RetryOutcome, RetryPolicy, retry_until};
pub use service::{InstanceStatus, TradingService};
pub use verifier::{ConnectionVerifier, HealthProbe, LogMarkerProbe};

use crate::slot::SlotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one slot's trading terminal.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with `Faulted`
/// reachable from `Starting` or `Running` on an unrecoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstanceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Faulted,
}

impl InstanceState {
    /// Only an idle or faulted slot may be (re)started.
    pub fn can_start(self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Faulted)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Stopped => "stopped",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Per-connection bookkeeping maintained by the verifier and the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMonitorState {
    pub connection_id: Uuid,
    pub slot: SlotId,
    pub last_check: Option<DateTime<Utc>>,
    pub is_connected: bool,
    pub reconnect_attempts: u32,
}

impl ConnectionMonitorState {
    pub fn new(slot: SlotId) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            slot,
            last_check: None,
            is_connected: false,
            reconnect_attempts: 0,
        }
    }

    /// A verified success resets the reconnect counter.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_check = Some(at);
        self.is_connected = true;
        self.reconnect_attempts = 0;
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.last_check = Some(at);
        self.is_connected = false;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
    }
}

/// The result handed back to the UI/API layer for a start-trading request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradingOutcome {
    pub fn succeeded(message: impl Into<String>, slot: SlotId, connection_id: Uuid) -> Self {
        Self {
            success: true,
            message: message.into(),
            connection_id: Some(connection_id),
            slot: Some(slot),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            connection_id: None,
            slot: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

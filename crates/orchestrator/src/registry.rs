use chrono::{DateTime, Utc};
use core_types::{ConnectionMonitorState, SlotId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The registry key for a slot's connection.
pub fn key_for(slot: SlotId) -> String {
    slot.instance_name()
}

/// In-memory monitoring state, keyed by connection identifier.
///
/// Owned by the trading service: created when it starts and cleared when it stops.
/// Nothing is persisted and there is no eviction; the slot range bounds the size.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, ConnectionMonitorState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<ConnectionMonitorState> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn set(&self, id: impl Into<String>, state: ConnectionMonitorState) {
        self.entries.write().await.insert(id.into(), state);
    }

    pub async fn remove(&self, id: &str) -> Option<ConnectionMonitorState> {
        self.entries.write().await.remove(id)
    }

    /// Applies the result of one health check to an existing entry.
    ///
    /// Unknown ids are ignored; returns the updated state when there was one.
    pub async fn record_check(
        &self,
        id: &str,
        connected: bool,
        at: DateTime<Utc>,
    ) -> Option<ConnectionMonitorState> {
        let mut entries = self.entries.write().await;
        let state = entries.get_mut(id)?;
        if connected {
            state.record_success(at);
        } else {
            state.record_failure(at);
        }
        Some(state.clone())
    }

    /// All entries ordered by slot.
    pub async fn snapshot(&self) -> Vec<(String, ConnectionMonitorState)> {
        let entries = self.entries.read().await;
        let mut all: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by_key(|(_, state)| state.slot);
        all
    }

    /// Drops every entry, returning how many there were.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

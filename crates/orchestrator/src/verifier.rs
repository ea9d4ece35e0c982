use crate::commands::{self, TERMINAL_IMAGE};
use crate::registry::{ConnectionRegistry, key_for};
use crate::retry::{RetryPolicy, retry_until};
use async_trait::async_trait;
use chrono::Utc;
use core_types::SlotId;
use remote_session::{CommandError, CommandRunner};
use std::sync::Arc;

/// Log phrases the terminal writes once it is logged in to its trade server.
pub const SUCCESS_MARKERS: [&str; 3] = ["Connection established", "Connected to", "Login successful"];

/// Case-sensitive substring match against [`SUCCESS_MARKERS`].
pub fn contains_success_marker(log: &str) -> bool {
    SUCCESS_MARKERS.iter().any(|marker| log.contains(marker))
}

/// A single yes/no answer to "is the terminal in this slot connected upstream?".
///
/// Implementations must not mutate anything; bookkeeping is the verifier's job.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_once(&self, slot: SlotId) -> Result<bool, CommandError>;
}

/// Decides connectivity from the process list and today's terminal log.
pub struct LogMarkerProbe {
    runner: Arc<CommandRunner>,
}

impl LogMarkerProbe {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl HealthProbe for LogMarkerProbe {
    async fn check_once(&self, slot: SlotId) -> Result<bool, CommandError> {
        let processes = match self.runner.run(&commands::terminal_process(slot)).await {
            Ok(output) => output,
            Err(e) if e.is_remote_failure() => {
                tracing::debug!(%slot, error = %e, "Process check failed on the host.");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if !processes.contains(TERMINAL_IMAGE) {
            tracing::debug!(%slot, "MT5 process not found.");
            return Ok(false);
        }

        let log = match self.runner.run(&commands::read_today_log(slot)).await {
            Ok(log) => log,
            Err(e) if e.is_remote_failure() => {
                tracing::debug!(%slot, "No terminal log for today yet.");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let connected = contains_success_marker(&log);
        tracing::debug!(%slot, connected, "Checked terminal log for connection markers.");
        Ok(connected)
    }
}

/// Polls a [`HealthProbe`] and records each result in the registry.
pub struct ConnectionVerifier {
    probe: Arc<dyn HealthProbe>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionVerifier {
    pub fn new(probe: Arc<dyn HealthProbe>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { probe, registry }
    }

    /// One probe. Transport errors propagate and leave the registry untouched.
    pub async fn check_once(&self, slot: SlotId) -> Result<bool, CommandError> {
        let connected = self.probe.check_once(slot).await?;
        self.registry.record_check(&key_for(slot), connected, Utc::now()).await;
        Ok(connected)
    }

    /// Probes up to `policy.max_attempts` times, stopping at the first success.
    pub async fn verify_with_retries(
        &self,
        slot: SlotId,
        policy: &RetryPolicy,
    ) -> Result<bool, CommandError> {
        let outcome = retry_until(policy, |attempt| async move {
            let connected = self.check_once(slot).await?;
            if connected {
                tracing::info!(%slot, attempt, "MT5 connection verified.");
            } else {
                tracing::info!(%slot, attempt, max_attempts = policy.max_attempts, "Connection check failed.");
            }
            Ok::<_, CommandError>(connected)
        })
        .await?;
        Ok(outcome.is_success())
    }
}

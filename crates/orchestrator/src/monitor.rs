use crate::registry::ConnectionRegistry;
use crate::verifier::ConnectionVerifier;
use core_types::SlotId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Background watchdog for every connection in the registry.
///
/// Meant to run in its own task next to the trading service. Each pass probes every
/// registered slot once; the verifier keeps the registry up to date, and this
/// component only decides when a connection counts as lost.
pub struct ConnectionMonitor {
    verifier: Arc<ConnectionVerifier>,
    registry: Arc<ConnectionRegistry>,
    /// Time between passes.
    interval: Duration,
    /// Consecutive failed checks tolerated before a connection is reported lost.
    max_reconnect_attempts: u32,
}

impl ConnectionMonitor {
    pub fn new(
        verifier: Arc<ConnectionVerifier>,
        registry: Arc<ConnectionRegistry>,
        interval: Duration,
        max_reconnect_attempts: u32,
    ) -> Self {
        Self { verifier, registry, interval, max_reconnect_attempts }
    }

    /// Runs one pass and returns the slots whose connection was lost on this pass.
    ///
    /// A slot is reported only on the check that first pushes its failure count past
    /// the limit, so a long outage is reported once.
    pub async fn run_check(&self) -> Vec<SlotId> {
        let mut lost = Vec::new();

        for (id, state) in self.registry.snapshot().await {
            let slot = state.slot;
            match self.verifier.check_once(slot).await {
                Ok(true) => {
                    if state.reconnect_attempts > 0 {
                        tracing::info!(%slot, connection_id = %state.connection_id, "Connection recovered.");
                    }
                }
                Ok(false) => {
                    let Some(updated) = self.registry.get(&id).await else { continue };
                    if updated.reconnect_attempts == self.max_reconnect_attempts.saturating_add(1) {
                        tracing::error!(
                            %slot,
                            connection_id = %updated.connection_id,
                            attempts = updated.reconnect_attempts,
                            "MT5 connection lost."
                        );
                        lost.push(slot);
                    } else {
                        tracing::warn!(%slot, attempts = updated.reconnect_attempts, "Connection check failed.");
                    }
                }
                Err(e) => {
                    tracing::warn!(%slot, error = %e, "Could not check connection.");
                }
            }
        }

        lost
    }

    /// Loops until `stop` flips to `true` or its sender is dropped.
    pub async fn start(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting connection monitor.");
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; slots were just verified by their start.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_check().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Connection monitor stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::key_for;
    use crate::verifier::HealthProbe;
    use async_trait::async_trait;
    use core_types::ConnectionMonitorState;
    use remote_session::CommandError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct SwitchProbe {
        up: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthProbe for SwitchProbe {
        async fn check_once(&self, _slot: SlotId) -> Result<bool, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.up.load(Ordering::SeqCst))
        }
    }

    async fn setup(up: bool) -> (Arc<SwitchProbe>, Arc<ConnectionRegistry>, ConnectionMonitor) {
        let probe = Arc::new(SwitchProbe { up: AtomicBool::new(up), calls: AtomicU32::new(0) });
        let registry = Arc::new(ConnectionRegistry::new());
        let slot = SlotId::new(1).unwrap();
        registry.set(key_for(slot), ConnectionMonitorState::new(slot)).await;
        let verifier = Arc::new(ConnectionVerifier::new(probe.clone(), registry.clone()));
        let monitor = ConnectionMonitor::new(verifier, registry.clone(), Duration::from_secs(30), 3);
        (probe, registry, monitor)
    }

    #[tokio::test]
    async fn loss_is_reported_once() {
        let (probe, registry, monitor) = setup(false).await;

        let mut reports = Vec::new();
        for _ in 0..6 {
            reports.push(monitor.run_check().await.len());
        }
        assert_eq!(reports, vec![0, 0, 0, 1, 0, 0]);

        probe.up.store(true, Ordering::SeqCst);
        assert!(monitor.run_check().await.is_empty());
        assert_eq!(registry.get("mt5-instance-1").await.unwrap().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let (probe, _registry, monitor) = setup(true).await;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.start(stop_rx));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);

        stop_tx.send_replace(true);
        task.await.unwrap();
    }
}

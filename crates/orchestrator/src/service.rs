use crate::allocator::SlotAllocator;
use crate::controller::{ControllerTimings, InstanceController};
use crate::credentials::CredentialStore;
use crate::error::ServiceError;
use crate::monitor::ConnectionMonitor;
use crate::registry::{ConnectionRegistry, key_for};
use crate::verifier::{ConnectionVerifier, LogMarkerProbe};
use configuration::OrchestratorConfig;
use core_types::{ConnectionMonitorState, InstanceCredentials, InstanceState, SlotId, TradingOutcome};
use remote_session::{CommandRunner, ConnectError, RemoteShell};
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything known about one slot, for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub slot: SlotId,
    pub state: InstanceState,
    /// Docker's status line; empty when the container does not exist.
    pub container_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<ConnectionMonitorState>,
}

struct MonitorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The entry point used by the API and the CLI.
///
/// Owns the connection registry and the monitor task. All remote work goes through
/// one `CommandRunner` over the shared shell.
pub struct TradingService {
    shell: Arc<dyn RemoteShell>,
    store: Arc<dyn CredentialStore>,
    allocator: SlotAllocator,
    controller: InstanceController,
    verifier: Arc<ConnectionVerifier>,
    registry: Arc<ConnectionRegistry>,
    monitor_interval: Duration,
    max_reconnect_attempts: u32,
    monitor: StdMutex<Option<MonitorTask>>,
}

impl TradingService {
    pub fn new(shell: Arc<dyn RemoteShell>, store: Arc<dyn CredentialStore>, config: &OrchestratorConfig) -> Self {
        let runner = Arc::new(CommandRunner::new(shell.clone()));
        let registry = Arc::new(ConnectionRegistry::new());
        let probe = Arc::new(LogMarkerProbe::new(runner.clone()));
        let verifier = Arc::new(ConnectionVerifier::new(probe, registry.clone()));

        Self {
            shell,
            store,
            allocator: SlotAllocator::new(runner.clone()),
            controller: InstanceController::new(runner, verifier.clone(), ControllerTimings::from(config)),
            verifier,
            registry,
            monitor_interval: config.monitor_interval(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            monitor: StdMutex::new(None),
        }
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.shell.connect().await
    }

    /// Spawns the connection monitor. Does nothing if it is already running.
    pub fn start_monitor(&self) {
        let mut monitor = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if monitor.is_some() {
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let task = ConnectionMonitor::new(
            self.verifier.clone(),
            self.registry.clone(),
            self.monitor_interval,
            self.max_reconnect_attempts,
        );
        let handle = tokio::spawn(task.start(stop_rx));
        *monitor = Some(MonitorTask { stop, handle });
    }

    /// Stops the monitor, forgets every tracked connection and disconnects.
    pub async fn shutdown(&self) {
        let task = self.monitor.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.stop.send_replace(true);
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Connection monitor task ended abnormally.");
            }
        }

        let cleared = self.registry.clear().await;
        self.shell.disconnect().await;
        tracing::info!(cleared, "Trading service shut down.");
    }

    /// Starts a terminal for `user_id` on the lowest free slot.
    ///
    /// Never fails: errors are folded into an unsuccessful outcome.
    pub async fn start_trading(&self, user_id: &str) -> TradingOutcome {
        match self.try_start_trading(user_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to start trading.");
                TradingOutcome::failed(e.user_message(), e.to_string())
            }
        }
    }

    async fn try_start_trading(&self, user_id: &str) -> Result<TradingOutcome, ServiceError> {
        let connection = self.store.get(user_id).await?;
        let secret = self.store.secret(user_id).await?;
        let credentials = InstanceCredentials::new(connection.account_id, secret, connection.server)?;

        let claim = self.allocator.claim_slot().await?;
        let slot = claim.slot();
        let id = key_for(slot);
        let state = ConnectionMonitorState::new(slot);
        let connection_id = state.connection_id;
        self.registry.set(id.clone(), state).await;
        tracing::info!(user_id, %slot, %connection_id, "Starting MT5 for user.");

        if let Err(e) = self.controller.start(slot, &credentials).await {
            if let Err(release_err) = self.controller.discard(slot).await {
                tracing::warn!(%slot, error = %release_err, "Failed to release slot after failed start.");
            }
            self.registry.remove(&id).await;
            return Err(e.into());
        }

        if !connection.trading_pair.trim().is_empty() {
            if let Err(e) = self.controller.set_trading_pair(slot, &connection.trading_pair).await {
                tracing::warn!(%slot, error = %e, "Could not set trading pair, continuing.");
            }
        }

        drop(claim);
        Ok(TradingOutcome::succeeded("MT5 started successfully", slot, connection_id))
    }

    /// The lowest slot with no running container, without reserving it.
    pub async fn available_slot(&self) -> Result<SlotId, ServiceError> {
        Ok(self.allocator.find_available_slot().await?)
    }

    /// Stops the terminal and container in `slot` and stops tracking it.
    pub async fn stop_trading(&self, slot: SlotId) -> Result<(), ServiceError> {
        self.controller.release(slot).await?;
        self.registry.remove(&key_for(slot)).await;
        Ok(())
    }

    /// Kills only the terminal; the container keeps running.
    pub async fn stop_terminal(&self, slot: SlotId) -> Result<(), ServiceError> {
        Ok(self.controller.stop(slot).await?)
    }

    pub async fn set_pair(&self, slot: SlotId, pair: &str) -> Result<(), ServiceError> {
        Ok(self.controller.set_trading_pair(slot, pair).await?)
    }

    pub async fn instance_status(&self, slot: SlotId) -> Result<InstanceStatus, ServiceError> {
        let container_status = self.controller.container_status(slot).await?;
        Ok(InstanceStatus {
            slot,
            state: self.controller.state(slot),
            container_status,
            monitor: self.registry.get(&key_for(slot)).await,
        })
    }

    /// One connection probe, recorded in the registry if the slot is tracked.
    pub async fn check_connection(&self, slot: SlotId) -> Result<bool, ServiceError> {
        Ok(self.verifier.check_once(slot).await?)
    }

    pub async fn connections(&self) -> Vec<ConnectionMonitorState> {
        self.registry.snapshot().await.into_iter().map(|(_, state)| state).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ConfigCredentialStore;
    use crate::testing::*;
    use configuration::UserEntry;

    fn store() -> Arc<ConfigCredentialStore> {
        let users = vec![UserEntry {
            user_id: "alice".into(),
            account_id: "5012345".into(),
            server: "Deriv-Demo".into(),
            trading_pair: "EURUSD".into(),
            secret_env: "MT5_SECRET_ALICE".into(),
        }];
        Arc::new(ConfigCredentialStore::with_lookup(&users, |_| Some("hunter2".into())))
    }

    fn service(shell: &Arc<ScriptedShell>) -> TradingService {
        TradingService::new(shell.clone(), store(), &OrchestratorConfig::default())
    }

    fn healthy_host() -> Arc<ScriptedShell> {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(LIST, ok("mt5-instance-1\nmt5-instance-3\n"))
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(CONNECTED_LOG));
        shell
    }

    #[tokio::test(start_paused = true)]
    async fn starts_on_lowest_free_slot() {
        let shell = healthy_host();
        let service = service(&shell);

        let outcome = service.start_trading("alice").await;

        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.slot.map(SlotId::get), Some(2));
        let tracked = service.connections().await;
        assert_eq!(tracked.len(), 1);
        assert_eq!(Some(tracked[0].connection_id), outcome.connection_id);
        assert!(tracked[0].is_connected);
        assert_eq!(shell.count(SELECT_SYMBOL), 1);
        assert!(shell.calls().iter().all(|c| !c.contains("hunter2") || c.contains(LAUNCH)));
    }

    #[tokio::test]
    async fn unknown_user_fails_without_remote_work() {
        let shell = healthy_host();
        let outcome = service(&shell).start_trading("mallory").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "No connection details found");
        assert!(shell.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_releases_the_slot() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(LIST, ok(""))
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(IDLE_LOG));
        let service = service(&shell);

        let outcome = service.start_trading("alice").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Failed to establish MT5 connection after multiple attempts");
        assert!(!outcome.error.unwrap_or_default().contains("hunter2"));
        assert!(service.connections().await.is_empty());
        assert_eq!(shell.count(DOCKER_STOP), 1);
        assert_eq!(service.controller.state(SlotId::new(1).unwrap()), InstanceState::Faulted);
        let status = service.instance_status(SlotId::new(1).unwrap()).await.unwrap();
        assert_eq!(status.state, InstanceState::Faulted);
        assert!(service.allocator.claimed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pair_failure_does_not_fail_the_start() {
        let shell = healthy_host();
        shell.on(SELECT_SYMBOL, exit(1, "symbol not found"));
        let service = service(&shell);

        let outcome = service.start_trading("alice").await;
        assert!(outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_monitor_and_clears_registry() {
        let shell = healthy_host();
        let service = service(&shell);
        assert!(service.start_trading("alice").await.success);
        service.start_monitor();
        service.start_monitor();

        service.shutdown().await;

        assert!(service.connections().await.is_empty());
        assert!(service.monitor.lock().unwrap().is_none());
        assert_eq!(shell.disconnects(), 1);
    }

    #[tokio::test]
    async fn status_combines_container_and_registry() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on(CONTAINER_STATUS, ok("Exited (0) 2 hours ago\n"));
        let status = service(&shell).instance_status(SlotId::new(4).unwrap()).await.unwrap();

        assert_eq!(status.state, InstanceState::Stopped);
        assert_eq!(status.container_status, "Exited (0) 2 hours ago");
        assert!(status.monitor.is_none());
    }
}

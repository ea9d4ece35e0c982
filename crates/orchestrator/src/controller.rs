use crate::commands::{self, TERMINAL_IMAGE};
use crate::error::{PairError, StartError, StopError};
use crate::retry::RetryPolicy;
use crate::verifier::ConnectionVerifier;
use configuration::OrchestratorConfig;
use core_types::{InstanceCredentials, InstanceState, SlotId};
use remote_session::{CommandError, CommandRunner};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Fixed waits used while bringing a terminal up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTimings {
    /// Pause after killing a stale terminal before launching a new one.
    pub quiescence: Duration,
    /// Pause after launch before the first connection check.
    pub startup_grace: Duration,
    pub verify: RetryPolicy,
}

impl From<&OrchestratorConfig> for ControllerTimings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            quiescence: config.quiescence(),
            startup_grace: config.startup_grace(),
            verify: RetryPolicy::fixed(config.verify_attempts, config.verify_interval()),
        }
    }
}

impl Default for ControllerTimings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

/// Drives the lifecycle of the terminal in each slot.
pub struct InstanceController {
    runner: Arc<CommandRunner>,
    verifier: Arc<ConnectionVerifier>,
    timings: ControllerTimings,
    states: StdMutex<HashMap<SlotId, InstanceState>>,
}

impl InstanceController {
    pub fn new(runner: Arc<CommandRunner>, verifier: Arc<ConnectionVerifier>, timings: ControllerTimings) -> Self {
        Self {
            runner,
            verifier,
            timings,
            states: StdMutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, slot: SlotId) -> InstanceState {
        self.lock_states().get(&slot).copied().unwrap_or_default()
    }

    fn set_state(&self, slot: SlotId, state: InstanceState) -> InstanceState {
        self.lock_states().insert(slot, state).unwrap_or_default()
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<SlotId, InstanceState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launches the terminal in `slot` logged in with `credentials` and waits until it
    /// reports a connection to its trade server.
    ///
    /// Leaves the slot `Running` on success and `Faulted` on any failure.
    pub async fn start(&self, slot: SlotId, credentials: &InstanceCredentials) -> Result<(), StartError> {
        {
            let mut states = self.lock_states();
            let current = states.get(&slot).copied().unwrap_or_default();
            if !current.can_start() {
                return Err(StartError::InvalidState { slot, state: current });
            }
            states.insert(slot, InstanceState::Starting);
        }
        tracing::info!(%slot, phase = "starting", "Starting MT5 instance.");

        match self.bring_up(slot, credentials).await {
            Ok(()) => {
                self.set_state(slot, InstanceState::Running);
                tracing::info!(%slot, phase = "running", "MT5 instance started and connected.");
                Ok(())
            }
            Err(e) => {
                self.set_state(slot, InstanceState::Faulted);
                tracing::error!(%slot, phase = "faulted", error = %e, "Failed to start MT5 instance.");
                Err(e)
            }
        }
    }

    async fn bring_up(&self, slot: SlotId, credentials: &InstanceCredentials) -> Result<(), StartError> {
        self.ensure_host_active(slot).await?;
        self.terminate_stale(slot).await?;

        self.runner.run(&commands::launch_terminal(slot, credentials)).await?;
        tracing::info!(%slot, phase = "launched", grace_secs = self.timings.startup_grace.as_secs(), "Terminal launched, waiting before verification.");
        tokio::time::sleep(self.timings.startup_grace).await;

        let policy = self.timings.verify;
        if self.verifier.verify_with_retries(slot, &policy).await? {
            Ok(())
        } else {
            Err(StartError::VerificationTimeout { slot, attempts: policy.max_attempts })
        }
    }

    /// Makes sure the slot's container is up, starting it once if it exists but is stopped.
    async fn ensure_host_active(&self, slot: SlotId) -> Result<(), StartError> {
        if self.container_running(slot).await? {
            return Ok(());
        }

        tracing::warn!(%slot, phase = "container", "Container is not running, attempting docker start.");
        match self.runner.run(&commands::start_container(slot)).await {
            Ok(_) => {}
            Err(e) if e.is_remote_failure() => {
                tracing::warn!(%slot, error = %e, "docker start failed.");
                return Err(StartError::HostNotReady { slot });
            }
            Err(e) => return Err(e.into()),
        }

        if self.container_running(slot).await? {
            Ok(())
        } else {
            Err(StartError::HostNotReady { slot })
        }
    }

    /// Kills a terminal left over from an earlier session and waits for it to settle.
    async fn terminate_stale(&self, slot: SlotId) -> Result<(), StartError> {
        let processes = match self.runner.run(&commands::terminal_process(slot)).await {
            Ok(output) => output,
            Err(e) if e.is_remote_failure() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !processes.contains(TERMINAL_IMAGE) {
            return Ok(());
        }

        tracing::info!(%slot, phase = "terminating", "Existing terminal found, stopping it first.");
        match self.runner.run(&commands::terminate_terminal(slot)).await {
            Ok(_) => {}
            Err(e) if e.is_remote_failure() => {
                tracing::debug!(%slot, error = %e, "Terminal exited before it could be killed.");
            }
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(self.timings.quiescence).await;
        Ok(())
    }

    /// Kills the terminal in `slot`. Succeeds when there was nothing to kill.
    ///
    /// Refused while a start is in flight for the slot.
    pub async fn stop(&self, slot: SlotId) -> Result<(), StopError> {
        let previous = {
            let mut states = self.lock_states();
            let current = states.get(&slot).copied().unwrap_or_default();
            if current == InstanceState::Starting {
                return Err(StopError::StillStarting { slot });
            }
            states.insert(slot, InstanceState::Stopping);
            current
        };
        tracing::info!(%slot, phase = "stopping", "Stopping MT5 terminal.");

        if let Err(source) = self.kill_terminal(slot).await {
            self.set_state(slot, previous);
            return Err(StopError::Command { slot, source });
        }

        self.set_state(slot, InstanceState::Stopped);
        tracing::info!(%slot, phase = "stopped", "MT5 terminal stopped.");
        Ok(())
    }

    async fn kill_terminal(&self, slot: SlotId) -> Result<(), CommandError> {
        match self.runner.run(&commands::terminate_terminal(slot)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_remote_failure() => {
                tracing::debug!(%slot, error = %e, "No terminal process to stop.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn stop_container(&self, slot: SlotId) -> Result<(), CommandError> {
        match self.runner.run(&commands::stop_container(slot)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_remote_failure() => {
                tracing::debug!(%slot, error = %e, "Container was not running.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stops the terminal and then the container, returning the slot to the pool.
    pub async fn release(&self, slot: SlotId) -> Result<(), StopError> {
        self.stop(slot).await?;
        self.stop_container(slot)
            .await
            .map_err(|source| StopError::Command { slot, source })?;
        tracing::info!(%slot, phase = "released", "Instance slot released.");
        Ok(())
    }

    /// Frees the container of a slot whose start failed.
    ///
    /// Unlike [`InstanceController::release`] the slot keeps its `Faulted` state, so
    /// status queries still show why it was given up.
    pub async fn discard(&self, slot: SlotId) -> Result<(), StopError> {
        self.kill_terminal(slot)
            .await
            .map_err(|source| StopError::Command { slot, source })?;
        self.stop_container(slot)
            .await
            .map_err(|source| StopError::Command { slot, source })?;
        tracing::info!(%slot, phase = "discarded", state = %self.state(slot), "Cleaned up after failed start.");
        Ok(())
    }

    /// Selects `pair` as the terminal's active symbol.
    pub async fn set_trading_pair(&self, slot: SlotId, pair: &str) -> Result<(), PairError> {
        let pair = pair.trim();
        if pair.is_empty() {
            return Err(PairError::EmptyPair);
        }

        match self.runner.run(&commands::list_symbols(slot)).await {
            Ok(symbols) => tracing::debug!(%slot, symbols = %symbols.trim(), "Available symbols."),
            Err(e) => tracing::debug!(%slot, error = %e, "Could not list symbols."),
        }

        self.runner
            .run(&commands::select_symbol(slot, pair))
            .await
            .map_err(|source| PairError::Command { slot, pair: pair.to_string(), source })?;
        tracing::info!(%slot, pair, "Trading pair set.");
        Ok(())
    }

    /// Docker's status line for the slot's container, empty when it does not exist.
    pub async fn container_status(&self, slot: SlotId) -> Result<String, CommandError> {
        let status = self.runner.run(&commands::container_status(slot)).await?;
        Ok(status.trim().to_string())
    }

    pub async fn container_running(&self, slot: SlotId) -> Result<bool, CommandError> {
        let ids = self.runner.run(&commands::container_running(slot)).await?;
        Ok(!ids.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use crate::testing::*;
    use crate::verifier::LogMarkerProbe;
    use core_types::Secret;
    use tokio::time::Instant;

    fn slot(n: u32) -> SlotId {
        SlotId::new(n).unwrap()
    }

    fn creds() -> InstanceCredentials {
        InstanceCredentials::new("5012345", Secret::new("hunter2"), "Deriv-Demo").unwrap()
    }

    fn controller(shell: &Arc<ScriptedShell>) -> InstanceController {
        let runner = Arc::new(CommandRunner::new(shell.clone()));
        let probe = Arc::new(LogMarkerProbe::new(runner.clone()));
        let verifier = Arc::new(ConnectionVerifier::new(probe, Arc::new(ConnectionRegistry::new())));
        InstanceController::new(runner, verifier, ControllerTimings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_start_launches_and_verifies() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(CONNECTED_LOG));
        let controller = controller(&shell);
        let started = Instant::now();

        controller.start(slot(1), &creds()).await.unwrap();

        assert_eq!(controller.state(slot(1)), InstanceState::Running);
        assert_eq!(shell.count(TASKKILL), 0);
        assert_eq!(shell.count(LAUNCH), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_terminal_is_killed_before_launch() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on(TASKLIST, ok(TERMINAL_RUNNING))
            .on(LOG, ok(CONNECTED_LOG));
        let controller = controller(&shell);
        let started = Instant::now();

        controller.start(slot(2), &creds()).await.unwrap();

        assert!(shell.position(TASKKILL).unwrap() < shell.position(LAUNCH).unwrap());
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_container_is_started_once() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on_seq(CONTAINER_UP, vec![ok(""), ok("a1b2c3\n")])
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(CONNECTED_LOG));
        let controller = controller(&shell);

        controller.start(slot(3), &creds()).await.unwrap();
        assert_eq!(shell.count(DOCKER_START), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_container_faults_the_slot() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok(""))
            .on(DOCKER_START, exit(1, "Error: No such container: mt5-instance-3"));
        let controller = controller(&shell);

        let err = controller.start(slot(3), &creds()).await.unwrap_err();

        assert_eq!(err, StartError::HostNotReady { slot: slot(3) });
        assert_eq!(controller.state(slot(3)), InstanceState::Faulted);
        assert_eq!(shell.count(LAUNCH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_verification_times_out() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(IDLE_LOG));
        let controller = controller(&shell);
        let started = Instant::now();

        let err = controller.start(slot(5), &creds()).await.unwrap_err();

        assert_eq!(err, StartError::VerificationTimeout { slot: slot(5), attempts: 3 });
        assert_eq!(controller.state(slot(5)), InstanceState::Faulted);
        assert_eq!(shell.count(LOG), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn running_slot_refuses_second_start() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(CONNECTED_LOG));
        let controller = controller(&shell);
        controller.start(slot(1), &creds()).await.unwrap();

        let err = controller.start(slot(1), &creds()).await.unwrap_err();
        assert_eq!(err, StartError::InvalidState { slot: slot(1), state: InstanceState::Running });
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on_seq(
            TASKKILL,
            vec![ok("SUCCESS: The process \"terminal64.exe\" has been terminated.\n"), exit(128, "ERROR: The process \"terminal64.exe\" not found.")],
        );
        let controller = controller(&shell);

        controller.stop(slot(6)).await.unwrap();
        controller.stop(slot(6)).await.unwrap();
        assert_eq!(controller.state(slot(6)), InstanceState::Stopped);
    }

    #[tokio::test]
    async fn stop_transport_failure_restores_state() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on(TASKKILL, Err(CommandError::Aborted));
        let controller = controller(&shell);

        let err = controller.stop(slot(6)).await.unwrap_err();
        assert_eq!(err, StopError::Command { slot: slot(6), source: CommandError::Aborted });
        assert_eq!(controller.state(slot(6)), InstanceState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_refused_while_starting() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(CONNECTED_LOG));
        let controller = controller(&shell);
        let creds = creds();

        let (started, stopped) = tokio::join!(controller.start(slot(1), &creds), async {
            // Lands inside the post-launch grace period.
            tokio::time::sleep(Duration::from_secs(3)).await;
            let state = controller.state(slot(1));
            (state, controller.stop(slot(1)).await)
        });

        assert_eq!(stopped, (InstanceState::Starting, Err(StopError::StillStarting { slot: slot(1) })));
        started.unwrap();
        assert_eq!(controller.state(slot(1)), InstanceState::Running);
        assert_eq!(shell.count(TASKKILL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_after_failed_start_keeps_fault() {
        let shell = Arc::new(ScriptedShell::new());
        shell
            .on(CONTAINER_UP, ok("a1b2c3\n"))
            .on_seq(TASKLIST, vec![ok(NO_TERMINAL), ok(TERMINAL_RUNNING)])
            .on(LOG, ok(IDLE_LOG));
        let controller = controller(&shell);

        assert!(controller.start(slot(2), &creds()).await.is_err());
        controller.discard(slot(2)).await.unwrap();

        assert_eq!(controller.state(slot(2)), InstanceState::Faulted);
        assert!(shell.position(TASKKILL).unwrap() < shell.position(DOCKER_STOP).unwrap());
    }

    #[tokio::test]
    async fn pair_selection() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on(LIST_SYMBOLS, exit(1, "unknown option")).on(SELECT_SYMBOL, ok(""));
        let controller = controller(&shell);

        assert_eq!(controller.set_trading_pair(slot(2), "  ").await, Err(PairError::EmptyPair));
        controller.set_trading_pair(slot(2), "EURUSD").await.unwrap();
        assert!(shell.calls().last().unwrap().ends_with("--symbol 'EURUSD'"));
    }

    #[tokio::test]
    async fn release_stops_terminal_then_container() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on(DOCKER_STOP, ok("mt5-instance-8\n"));
        let controller = controller(&shell);

        controller.release(slot(8)).await.unwrap();
        assert!(shell.position(TASKKILL).unwrap() < shell.position(DOCKER_STOP).unwrap());
        assert_eq!(controller.state(slot(8)), InstanceState::Stopped);
    }

    #[tokio::test]
    async fn container_status_is_trimmed() {
        let shell = Arc::new(ScriptedShell::new());
        shell.on(CONTAINER_STATUS, ok("Up 3 hours\n"));
        assert_eq!(controller(&shell).container_status(slot(1)).await.unwrap(), "Up 3 hours");
    }
}

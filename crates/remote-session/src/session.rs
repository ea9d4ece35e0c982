use crate::error::{CommandError, ConnectError};
use crate::shell::{ExecOutput, RemoteShell};
use async_trait::async_trait;
use configuration::VpsConfig;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Connection state of the single VPS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
}

/// Host key policy for the `russh` client.
struct HostKeyCheck {
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        match &self.expected_fingerprint {
            Some(expected) => {
                let expected = expected.trim().trim_start_matches("SHA256:");
                let accepted = expected == fingerprint;
                if !accepted {
                    tracing::error!(%fingerprint, "VPS host key does not match the pinned fingerprint.");
                }
                Ok(accepted)
            }
            None => {
                tracing::debug!(%fingerprint, "Accepting VPS host key (no fingerprint pinned).");
                Ok(true)
            }
        }
    }
}

struct SessionInner {
    state: SessionState,
    handle: Option<Arc<Handle<HostKeyCheck>>>,
}

/// The one persistent, authenticated SSH connection to the VPS.
///
/// Created once at process start with the `[vps]` configuration. `connect` is
/// serialised internally so only one handshake can be in flight. Commands run over
/// a fresh exec channel each, and only one channel is open at a time.
pub struct RemoteSession {
    config: VpsConfig,
    inner: Mutex<SessionInner>,
    /// Held for the whole handshake; guarantees a single in-flight connect.
    connect_gate: Mutex<()>,
    /// Held while a command channel is open.
    channel: Mutex<()>,
    /// Flipped to `true` by `disconnect` to make an open channel close early.
    shutdown: watch::Sender<bool>,
}

impl RemoteSession {
    pub fn new(config: VpsConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            inner: Mutex::new(SessionInner { state: SessionState::Disconnected, handle: None }),
            connect_gate: Mutex::new(()),
            channel: Mutex::new(()),
            shutdown,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Opens and authenticates the session.
    ///
    /// Calling this while the session is already ready is a no-op. No retries happen
    /// here; a failed attempt leaves the session `Disconnected` for the caller to retry.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _gate = self.connect_gate.lock().await;

        {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Ready {
                tracing::debug!(host = %self.config.host, "SSH session already ready.");
                return Ok(());
            }
            inner.state = SessionState::Connecting;
        }

        let timeout = self.config.connect_timeout();
        let result = match tokio::time::timeout(timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(timeout)),
        };

        let mut inner = self.inner.lock().await;
        match result {
            Ok(handle) => {
                inner.handle = Some(Arc::new(handle));
                inner.state = SessionState::Ready;
                self.shutdown.send_replace(false);
                tracing::info!(
                    host = %self.config.host,
                    port = self.config.port,
                    username = %self.config.username,
                    "SSH connection established."
                );
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Disconnected;
                tracing::error!(host = %self.config.host, error = %e, "SSH connection failed.");
                Err(e)
            }
        }
    }

    /// Closes any open command channel, then the session itself.
    ///
    /// Safe to call repeatedly and when never connected.
    pub async fn disconnect(&self) {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Disconnected;
            inner.handle.take()
        };

        let Some(handle) = handle else {
            tracing::debug!("SSH session already disconnected.");
            return;
        };

        self.shutdown.send_replace(true);
        // An in-flight command notices the shutdown flag, closes its channel and
        // releases this lock.
        let _channel = self.channel.lock().await;

        if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "English").await {
            tracing::warn!(error = %e, "Error while closing SSH session.");
        }
        tracing::info!(host = %self.config.host, "SSH session closed.");
    }

    async fn open(&self) -> Result<Handle<HostKeyCheck>, ConnectError> {
        let cfg = &self.config;
        if cfg.host.trim().is_empty() {
            return Err(ConnectError::MissingConfig("host"));
        }
        if cfg.username.trim().is_empty() {
            return Err(ConnectError::MissingConfig("username"));
        }
        if cfg.private_key_path.as_os_str().is_empty() {
            return Err(ConnectError::MissingConfig("private_key_path"));
        }

        let key_pair = russh_keys::load_secret_key(&cfg.private_key_path, None).map_err(|e| {
            ConnectError::KeyLoad {
                path: cfg.private_key_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        // The session is meant to stay open between commands.
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });
        let handler = HostKeyCheck { expected_fingerprint: cfg.host_key_fingerprint.clone() };

        let mut handle = client::connect(ssh_config, (cfg.host.as_str(), cfg.port), handler).await?;
        let authenticated = handle
            .authenticate_publickey(cfg.username.as_str(), Arc::new(key_pair))
            .await?;
        if !authenticated {
            return Err(ConnectError::AuthenticationFailed(cfg.username.clone()));
        }

        Ok(handle)
    }

    async fn ready_handle(&self) -> Result<Arc<Handle<HostKeyCheck>>, CommandError> {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.handle) {
            (SessionState::Ready, Some(handle)) => Ok(Arc::clone(handle)),
            _ => Err(CommandError::NotReady),
        }
    }
}

#[async_trait]
impl RemoteShell for RemoteSession {
    async fn connect(&self) -> Result<(), ConnectError> {
        RemoteSession::connect(self).await
    }

    async fn disconnect(&self) {
        RemoteSession::disconnect(self).await
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput, CommandError> {
        let handle = self.ready_handle().await?;
        let _channel_guard = self.channel.lock().await;

        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Err(CommandError::Aborted);
        }

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| CommandError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| CommandError::Channel(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        let mut exit_signal = None;

        loop {
            tokio::select! {
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { ref data }) => stdout.extend_from_slice(data),
                    Some(ChannelMsg::ExtendedData { ref data, .. }) => stderr.extend_from_slice(data),
                    Some(ChannelMsg::ExitStatus { exit_status: code }) => exit_status = Some(code),
                    Some(ChannelMsg::ExitSignal { signal_name, error_message, .. }) => {
                        if !error_message.is_empty() {
                            stderr.extend_from_slice(error_message.as_bytes());
                        }
                        exit_signal = Some(format!("{signal_name:?}"));
                    }
                    Some(_) => {}
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = channel.close().await;
                        return Err(CommandError::Aborted);
                    }
                }
            }
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
            exit_signal,
        })
    }
}

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vps: VpsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Connection details served by the configuration-backed credential store.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// Where and how to reach the host that runs the terminal containers.
///
/// Every field except `port` defaults to empty. Missing values are not an error at
/// load time; the remote session refuses to connect without them instead.
#[derive(Debug, Clone, Deserialize)]
pub struct VpsConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    /// Path to the private key file used for public-key authentication.
    #[serde(default)]
    pub private_key_path: PathBuf,
    /// Upper bound on handshake plus authentication.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// SHA-256 host key fingerprint to pin. When unset any host key is accepted.
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
}

/// Timings and budgets for the instance lifecycle.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause after killing a stale terminal before launching a new one.
    #[serde(default = "default_quiescence_secs")]
    pub quiescence_secs: u64,
    /// Pause between the launch command and the first verification probe.
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_interval_secs")]
    pub verify_interval_secs: u64,
    /// How often the background monitor re-probes registered connections.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Consecutive failed probes before a connection is reported as lost.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// Settings for the HTTP API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
}

/// One user's last-known connection details.
///
/// The trading password is never written to the file. `secret_env` names the
/// environment variable it is read from.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub user_id: String,
    pub account_id: String,
    pub server: String,
    /// Selected after launch when set.
    #[serde(default)]
    pub trading_pair: String,
    pub secret_env: String,
}

impl VpsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl OrchestratorConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_secs(self.quiescence_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

// --- Default Implementations ---
// These allow a deployment to run from environment variables alone, with no
// config.toml present.

fn default_ssh_port() -> u16 { 22 }
fn default_connect_timeout_secs() -> u64 { 60 }
fn default_quiescence_secs() -> u64 { 5 }
fn default_startup_grace_secs() -> u64 { 10 }
fn default_verify_attempts() -> u32 { 3 }
fn default_verify_interval_secs() -> u64 { 5 }
fn default_monitor_interval_secs() -> u64 { 30 }
fn default_max_reconnect_attempts() -> u32 { 3 }
fn default_bind_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 3000)) }
fn default_log_directory() -> PathBuf { PathBuf::from("logs") }
fn default_log_file_prefix() -> String { "mt5-fleet.log".to_string() }
fn default_log_filter() -> String { "info".to_string() }

impl Default for VpsConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            private_key_path: PathBuf::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            host_key_fingerprint: None,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            quiescence_secs: default_quiescence_secs(),
            startup_grace_secs: default_startup_grace_secs(),
            verify_attempts: default_verify_attempts(),
            verify_interval_secs: default_verify_interval_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            default_filter: default_log_filter(),
        }
    }
}

use crate::error::ConfigError;
use std::collections::HashSet;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    Config, LoggingConfig, OrchestratorConfig, ServerConfig, UserEntry, VpsConfig,
};

/// Environment variables that override the `[vps]` section of the file.
const ENV_OVERRIDES: [(&str, &str); 4] = [
    ("vps.host", "VPS_HOST"),
    ("vps.port", "VPS_PORT"),
    ("vps.username", "VPS_USERNAME"),
    ("vps.private_key_path", "VPS_PRIVATE_KEY"),
];

/// Loads the application configuration from `config.toml` and the process environment.
///
/// This function is the primary entry point for this crate. The file is optional;
/// `VPS_*` variables always win over values found in it.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"), |key| std::env::var(key).ok())
}

/// Loads configuration from an explicit file path, resolving overrides through `env`.
pub fn load_config_from<F>(path: &Path, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = config::Config::builder()
        // Tells the builder to look for the file, but not to insist on it.
        .add_source(config::File::from(path).required(false));

    for (key, var) in ENV_OVERRIDES {
        builder = builder.set_override_option(key, env(var))?;
    }

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.build()?.try_deserialize::<Config>()?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.vps.port == 0 {
        return Err(ConfigError::ValidationError("vps.port must be non-zero".to_string()));
    }
    if config.orchestrator.verify_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.verify_attempts must be at least 1".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for user in &config.users {
        if !seen.insert(user.user_id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate user entry '{}'",
                user.user_id
            )));
        }
        if user.secret_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "user '{}' has no secret_env",
                user.user_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from(Path::new("does-not-exist.toml"), |_| None).unwrap();
        assert_eq!(config.vps.port, 22);
        assert!(config.vps.host.is_empty());
        assert_eq!(config.orchestrator.verify_attempts, 3);
        assert_eq!(config.orchestrator.verify_interval_secs, 5);
        assert_eq!(config.orchestrator.quiescence_secs, 5);
        assert_eq!(config.vps.connect_timeout_secs, 60);
        assert!(config.users.is_empty());
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = write_config(
            r#"
            [vps]
            host = "10.0.0.1"
            username = "ubuntu"
            private_key_path = "keys/file.pem"
            "#,
        );
        let env = env_from(&[("VPS_HOST", "203.0.113.9"), ("VPS_PORT", "2222")]);

        let config = load_config_from(file.path(), env).unwrap();
        assert_eq!(config.vps.host, "203.0.113.9");
        assert_eq!(config.vps.port, 2222);
        assert_eq!(config.vps.username, "ubuntu");
        assert_eq!(config.vps.private_key_path, Path::new("keys/file.pem"));
    }

    #[test]
    fn users_and_timings_are_parsed() {
        let file = write_config(
            r#"
            [orchestrator]
            startup_grace_secs = 2
            verify_attempts = 5

            [[users]]
            user_id = "u-1"
            account_id = "5012345"
            server = "Deriv-Demo"
            trading_pair = "EURUSD"
            secret_env = "MT5_PASSWORD_U1"
            "#,
        );

        let config = load_config_from(file.path(), |_| None).unwrap();
        assert_eq!(config.orchestrator.startup_grace_secs, 2);
        assert_eq!(config.orchestrator.verify_attempts, 5);
        assert_eq!(config.orchestrator.verify_interval_secs, 5);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].trading_pair, "EURUSD");
    }

    #[test]
    fn zero_verify_attempts_is_rejected() {
        let file = write_config("[orchestrator]\nverify_attempts = 0\n");
        let err = load_config_from(file.path(), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn duplicate_users_are_rejected() {
        let entry = r#"
            [[users]]
            user_id = "u-1"
            account_id = "1"
            server = "s"
            trading_pair = "EURUSD"
            secret_env = "P"
        "#;
        let file = write_config(&format!("{entry}\n{entry}"));
        let err = load_config_from(file.path(), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}

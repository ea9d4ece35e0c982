use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A credential that must never reach a log line or a persisted store.
///
/// `Debug` and `Display` both render a fixed placeholder. The plaintext is only
/// reachable through [`Secret::expose`], which the remote command builder calls
/// when it assembles the launch command.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub const REDACTED: &'static str = "********";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::REDACTED)
    }
}

/// Login material pushed into a trading terminal at launch.
#[derive(Debug, Clone)]
pub struct InstanceCredentials {
    account_id: String,
    secret: Secret,
    server: String,
}

impl InstanceCredentials {
    /// Builds a credential set, rejecting any empty field.
    pub fn new(
        account_id: impl Into<String>,
        secret: Secret,
        server: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let account_id = account_id.into();
        let server = server.into();

        if account_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("account_id".to_string(), "must not be empty".to_string()));
        }
        if secret.is_empty() {
            return Err(CoreError::InvalidInput("secret".to_string(), "must not be empty".to_string()));
        }
        if server.trim().is_empty() {
            return Err(CoreError::InvalidInput("server".to_string(), "must not be empty".to_string()));
        }

        Ok(Self { account_id, secret, server })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

/// Last-known connection details for a user, as held by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnection {
    pub account_id: String,
    pub server: String,
    pub trading_pair: String,
}

use crate::error::StoreError;
use async_trait::async_trait;
use configuration::UserEntry;
use core_types::{Secret, UserConnection};
use std::collections::HashMap;

/// The upstream key-value collaborator holding each user's connection details.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<UserConnection, StoreError>;

    /// The trading password for `user_id`. Never cached by callers.
    async fn secret(&self, user_id: &str) -> Result<Secret, StoreError>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

struct StoredUser {
    connection: UserConnection,
    secret_env: String,
}

/// Serves users declared in `[[users]]`, resolving each secret from the
/// environment variable the entry names.
pub struct ConfigCredentialStore {
    users: HashMap<String, StoredUser>,
    lookup: Lookup,
}

impl ConfigCredentialStore {
    pub fn from_env(users: &[UserEntry]) -> Self {
        Self::with_lookup(users, |key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(users: &[UserEntry], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let users = users
            .iter()
            .map(|entry| {
                let stored = StoredUser {
                    connection: UserConnection {
                        account_id: entry.account_id.clone(),
                        server: entry.server.clone(),
                        trading_pair: entry.trading_pair.clone(),
                    },
                    secret_env: entry.secret_env.clone(),
                };
                (entry.user_id.clone(), stored)
            })
            .collect();
        Self { users, lookup: Box::new(lookup) }
    }

    fn user(&self, user_id: &str) -> Result<&StoredUser, StoreError> {
        self.users
            .get(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }
}

#[async_trait]
impl CredentialStore for ConfigCredentialStore {
    async fn get(&self, user_id: &str) -> Result<UserConnection, StoreError> {
        Ok(self.user(user_id)?.connection.clone())
    }

    async fn secret(&self, user_id: &str) -> Result<Secret, StoreError> {
        let user = self.user(user_id)?;
        match (self.lookup)(&user.secret_env) {
            Some(value) if !value.is_empty() => Ok(Secret::new(value)),
            _ => Err(StoreError::MissingSecret {
                user_id: user_id.to_string(),
                var: user.secret_env.clone(),
            }),
        }
    }
}

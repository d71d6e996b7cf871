//! Resolving decoded credential tokens to user records.

use crate::{connection::Identity, error::AuthError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Looks up the user a credential token belongs to.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn lookup_user(&self, token: &str) -> Result<Identity, AuthError>;
}

/// A token-to-user mapping, as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub token: String,
    #[serde(flatten)]
    pub identity: Identity,
}

/// Directory held in memory, keyed by token.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, Identity>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let directory = Self::new();
        for record in records {
            directory.insert(record.token, record.identity);
        }
        directory
    }

    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.users.insert(token.into(), identity);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn lookup_user(&self, token: &str) -> Result<Identity, AuthError> {
        self.users
            .get(token)
            .map(|identity| identity.value().clone())
            .ok_or(AuthError::UnknownUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_known_and_unknown_tokens() {
        let directory = InMemoryUserDirectory::from_records([UserRecord {
            token: "tok-alice".to_string(),
            identity: Identity::named("alice"),
        }]);

        let alice = directory.lookup_user("tok-alice").await.unwrap();
        assert_eq!(alice.display_name, "alice");
        assert!(matches!(
            directory.lookup_user("tok-nobody").await,
            Err(AuthError::UnknownUser)
        ));
    }

    #[test]
    fn test_user_record_is_flat() {
        let record: UserRecord = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "displayName": "alice"
        }))
        .unwrap();
        assert_eq!(record.identity, Identity::named("alice"));
    }
}

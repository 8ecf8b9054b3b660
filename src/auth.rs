// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! Credential checking and claims-based authorization.
//!
//! [`AuthBridge`] turns a username/password pair into an [`Identity`]
//! carrying the account's claim set. Account lookup goes through the
//! [`AccountStore`] trait and is async end-to-end, so an authentication
//! check suspends the request task while the store is queried instead of
//! blocking the runtime.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::repository::ConfigRepository;

/// Claim required to arm or disarm partitions.
pub const ARM_DISARM_CLAIM: &str = "ArmDisarm";

/// Salted SHA-256 hex digest of a password.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// One stored account, persisted in `Accounts.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub salt: String,
    pub password_hash: String,
    #[serde(default)]
    pub claims: Vec<String>,
}

impl Account {
    /// Build an account from a plaintext password.
    pub fn with_password(
        username: impl Into<String>,
        salt: impl Into<String>,
        password: &str,
        claims: Vec<String>,
    ) -> Self {
        let salt = salt.into();
        let password_hash = hash_password(&salt, password);
        Self {
            username: username.into(),
            salt,
            password_hash,
            claims,
        }
    }
}

/// An authenticated principal. Lives for one request.
#[derive(Debug, Clone)]
pub struct Identity {
    username: String,
    claims: HashSet<String>,
}

impl Identity {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn claims(&self) -> &HashSet<String> {
        &self.claims
    }

    /// Pure authorization predicate: granted iff the claim is present.
    pub fn has_claim(&self, claim: &str) -> bool {
        self.claims.contains(claim)
    }
}

/// Account lookup abstraction.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;
}

/// Accounts stored as a JSON array on disk, through the same repository
/// mechanics as the other configuration documents.
pub struct FileAccountStore {
    repo: ConfigRepository<Vec<Account>>,
}

impl FileAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            repo: ConfigRepository::new(path),
        }
    }

    /// Insert or replace an account and persist the store.
    pub async fn upsert(&self, account: Account) -> Result<()> {
        let mut accounts = self.repo.get().await?;
        accounts.retain(|a| a.username != account.username);
        accounts.push(account);
        self.repo.save(&accounts).await
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let accounts = self.repo.get().await?;
        Ok(accounts.into_iter().find(|a| a.username == username))
    }
}

/// Validates inbound credentials against an account store and produces the
/// claims-based identity used for authorization decisions.
pub struct AuthBridge {
    store: Arc<dyn AccountStore>,
}

impl AuthBridge {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Check a username/password pair.
    ///
    /// Fails with `AccountNotFound` for an unknown user and
    /// `InvalidCredential` on a password mismatch; on success returns an
    /// [`Identity`] carrying exactly the account's claims.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        let account = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| BridgeError::AccountNotFound {
                username: username.to_string(),
            })?;

        if hash_password(&account.salt, password) != account.password_hash {
            warn!("Password mismatch for {username}");
            return Err(BridgeError::InvalidCredential {
                username: username.to_string(),
            });
        }

        Ok(Identity {
            username: account.username,
            claims: account.claims.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemoryStore(HashMap<String, Account>);

    impl MemoryStore {
        fn with(accounts: Vec<Account>) -> Arc<Self> {
            Arc::new(Self(
                accounts.into_iter().map(|a| (a.username.clone(), a)).collect(),
            ))
        }
    }

    #[async_trait]
    impl AccountStore for MemoryStore {
        async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
            Ok(self.0.get(username).cloned())
        }
    }

    fn alice() -> Account {
        Account::with_password(
            "alice",
            "salt1",
            "right",
            vec![ARM_DISARM_CLAIM.to_string(), "ViewStatus".to_string()],
        )
    }

    #[tokio::test]
    async fn test_authenticate_success_carries_claims() {
        let bridge = AuthBridge::new(MemoryStore::with(vec![alice()]));
        let identity = bridge.authenticate("alice", "right").await.unwrap();
        assert_eq!(identity.username(), "alice");
        assert_eq!(identity.claims().len(), 2);
        assert!(identity.has_claim(ARM_DISARM_CLAIM));
        assert!(identity.has_claim("ViewStatus"));
        assert!(!identity.has_claim("Admin"));
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let bridge = AuthBridge::new(MemoryStore::with(vec![alice()]));
        assert!(matches!(
            bridge.authenticate("alice", "wrong").await,
            Err(BridgeError::InvalidCredential { .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let bridge = AuthBridge::new(MemoryStore::with(vec![alice()]));
        assert!(matches!(
            bridge.authenticate("mallory", "right").await,
            Err(BridgeError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(
            hash_password("salt1", "secret"),
            hash_password("salt2", "secret")
        );
        assert_eq!(
            hash_password("salt1", "secret"),
            hash_password("salt1", "secret")
        );
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAccountStore::new(dir.path().join("Accounts.json"));
        store.upsert(alice()).await.unwrap();

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, alice());
        assert!(store.find_by_username("bob").await.unwrap().is_none());

        // Upsert replaces rather than duplicates.
        let changed = Account::with_password("alice", "salt9", "new", vec![]);
        store.upsert(changed.clone()).await.unwrap();
        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, changed);
    }
}

// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret References
//!
//! Credentials (database passwords, repository access tokens) are never held
//! by the provisioning layer. Components carry a [`SecretRef`], an opaque
//! pointer into an external secret store, and resolve it only inside the call
//! that needs the value. A [`ResolvedSecret`] is zeroized when dropped and
//! redacts itself in `Debug` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// Errors reported by a secret store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// No secret is stored under the referenced name
    #[error("Secret not found: {0}")]
    NotFound(String),

    /// The store could not be reached
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque pointer to an externally stored secret
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef {
    name: String,
}

impl SecretRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the secret in the external store
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretRef({})", self.name)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret:{}", self.name)
    }
}

/// Plaintext secret value, zeroized on drop
pub struct ResolvedSecret(Zeroizing<String>);

impl ResolvedSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plaintext for the duration of the resolving call
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResolvedSecret(<redacted>)")
    }
}

/// External secret storage contract
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve a secret just-in-time
    async fn resolve(&self, secret: &SecretRef) -> Result<ResolvedSecret, SecretError>;

    /// Check that a secret exists without handing its value out
    async fn exists(&self, secret: &SecretRef) -> bool {
        self.resolve(secret).await.is_ok()
    }
}

/// In-process secret store used for local planning and tests
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret while building the store
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut secrets = self.secrets.into_inner();
        secrets.insert(name.into(), Zeroizing::new(value.into()));
        Self {
            secrets: RwLock::new(secrets),
        }
    }

    /// Store or replace a secret
    pub async fn put(&self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .write()
            .await
            .insert(name.into(), Zeroizing::new(value.into()));
    }

    /// Remove a secret
    pub async fn remove(&self, name: &str) -> bool {
        self.secrets.write().await.remove(name).is_some()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn resolve(&self, secret: &SecretRef) -> Result<ResolvedSecret, SecretError> {
        self.secrets
            .read()
            .await
            .get(secret.name())
            .map(|value| ResolvedSecret::new(value.as_str()))
            .ok_or_else(|| SecretError::NotFound(secret.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_secret() {
        let store = InMemorySecretStore::new().with_secret("mysql-token", "s3cr3t");
        let resolved = store.resolve(&SecretRef::new("mysql-token")).await.unwrap();
        assert_eq!(resolved.expose(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_resolve_missing_secret() {
        let store = InMemorySecretStore::new();
        let result = store.resolve(&SecretRef::new("github-token")).await;
        assert_eq!(
            result.unwrap_err(),
            SecretError::NotFound("github-token".to_string())
        );
        assert!(!store.exists(&SecretRef::new("github-token")).await);
    }

    #[tokio::test]
    async fn test_put_and_remove() {
        let store = InMemorySecretStore::new();
        store.put("github-token", "ghp_x").await;
        assert!(store.exists(&SecretRef::new("github-token")).await);
        assert!(store.remove("github-token").await);
        assert!(!store.exists(&SecretRef::new("github-token")).await);
    }

    #[test]
    fn test_resolve_outside_runtime() {
        let store = InMemorySecretStore::new().with_secret("github-token", "ghp_x");
        let resolved = tokio_test::block_on(store.resolve(&SecretRef::new("github-token")));
        assert_eq!(resolved.unwrap().expose(), "ghp_x");
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let resolved = ResolvedSecret::new("hunter2");
        assert!(!format!("{:?}", resolved).contains("hunter2"));
        assert_eq!(SecretRef::new("mysql-token").to_string(), "secret:mysql-token");
    }
}

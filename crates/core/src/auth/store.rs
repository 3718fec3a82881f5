use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::credential::Credential;
use crate::errors::CoreError;
use crate::storage::vault::{CredentialVault, StoredSession};

/// Supplies the bearer credential on demand.
///
/// `None` means "not logged in": callers must not start any remote call.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<Credential>;

    /// Remember a freshly issued credential.
    async fn store(&self, credential: Credential, email: Option<String>) -> Result<(), CoreError>;

    /// Forget the credential (logout).
    async fn clear(&self) -> Result<(), CoreError>;
}

/// Session kept in memory only; gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for MemoryTokenStore {
    async fn get_token(&self) -> Option<Credential> {
        self.credential
            .read()
            .await
            .clone()
            .filter(|c| !c.is_empty())
    }

    async fn store(&self, credential: Credential, _email: Option<String>) -> Result<(), CoreError> {
        *self.credential.write().await = Some(credential);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        *self.credential.write().await = None;
        Ok(())
    }
}

/// Session persisted in an encrypted [`CredentialVault`], cached in memory
/// after the first read.
///
/// Vault I/O is synchronous; the file is tiny and only touched at login,
/// logout and first access.
#[derive(Debug)]
pub struct VaultTokenStore {
    vault: CredentialVault,
    cached: RwLock<Option<Option<StoredSession>>>,
}

impl VaultTokenStore {
    pub fn new(vault: CredentialVault) -> Self {
        Self {
            vault,
            cached: RwLock::new(None),
        }
    }

    /// Email of the stored session, if any.
    pub async fn email(&self) -> Option<String> {
        self.session().await.and_then(|s| s.email)
    }

    async fn session(&self) -> Option<StoredSession> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            return cached.clone();
        }
        let mut guard = self.cached.write().await;
        if let Some(cached) = guard.as_ref() {
            return cached.clone();
        }
        let loaded = match self.vault.load() {
            Ok(session) => session,
            Err(e) => {
                // An unreadable vault is treated as logged out.
                warn!(path = %self.vault.path().display(), "credential vault unreadable: {e}");
                None
            }
        };
        *guard = Some(loaded.clone());
        loaded
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TokenProvider for VaultTokenStore {
    async fn get_token(&self) -> Option<Credential> {
        self.session()
            .await
            .map(|s| s.credential)
            .filter(|c| !c.is_empty())
    }

    async fn store(&self, credential: Credential, email: Option<String>) -> Result<(), CoreError> {
        let session = StoredSession::new(credential, email);
        self.vault.save(&session)?;
        debug!(path = %self.vault.path().display(), "session stored");
        *self.cached.write().await = Some(Some(session));
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.vault.clear()?;
        *self.cached.write().await = Some(None);
        Ok(())
    }
}

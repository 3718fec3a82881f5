use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::encryption::{self, KdfParams};
use super::format::{self, VaultHeader};
use crate::auth::credential::Credential;
use crate::errors::CoreError;

/// What survives an app restart: the bearer credential and who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub credential: Credential,
    pub email: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(credential: Credential, email: Option<String>) -> Self {
        Self {
            credential,
            email,
            saved_at: Utc::now(),
        }
    }
}

/// Encrypted on-disk session store.
///
/// Flow: StoredSession → bincode → AES-256-GCM(Argon2id(secret)) → BGCV bytes.
/// The secret comes from the platform keystore; the vault file alone is
/// useless without it.
pub struct CredentialVault {
    path: PathBuf,
    secret: String,
    kdf_params: KdfParams,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("path", &self.path)
            .field("kdf_params", &self.kdf_params)
            .finish()
    }
}

impl CredentialVault {
    pub fn new(path: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            secret: secret.into(),
            kdf_params: KdfParams::default(),
        }
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seal(&self, session: &StoredSession) -> Result<Vec<u8>, CoreError> {
        let plaintext = bincode::serialize(session)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize session: {e}")))?;

        let header = VaultHeader {
            version: format::CURRENT_VERSION,
            kdf_params: self.kdf_params,
            salt: encryption::random_bytes()?,
            nonce: encryption::random_bytes()?,
        };
        let key = encryption::derive_key(&self.secret, &header.salt, &header.kdf_params)?;
        let ciphertext = encryption::encrypt(&plaintext, &key, &header.nonce)?;

        format::write_vault(&header, &ciphertext)
    }

    pub fn open(&self, data: &[u8]) -> Result<StoredSession, CoreError> {
        let (header, ciphertext) = format::read_vault(data)?;
        let key = encryption::derive_key(&self.secret, &header.salt, &header.kdf_params)?;
        let plaintext = encryption::decrypt(ciphertext, &key, &header.nonce)?;

        bincode::deserialize(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize session: {e}")))
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), CoreError> {
        let bytes = self.seal(session)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// `Ok(None)` when no vault has been written yet.
    pub fn load(&self) -> Result<Option<StoredSession>, CoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => self.open(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the vault. Missing files are not an error.
    pub fn clear(&self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

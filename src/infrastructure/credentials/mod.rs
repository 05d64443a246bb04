//! In-memory session credential vault.
//!
//! Connect credentials are retained per agent so the orchestrator can
//! reconnect without asking the operator again. Entries are sealed with
//! AES-256-GCM under a process-local key; each seal uses a fresh random
//! nonce stored as a `nonce ‖ ciphertext` blob. Nothing touches disk.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use tokio::sync::RwLock;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::ports::client_driver::ConnectCredentials;

const NONCE_LEN: usize = 12;

/// Encrypted per-agent credential store.
pub struct CredentialVault {
    cipher: Aes256Gcm,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for CredentialVault {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialVault {
    /// Create a vault with a fresh process-local key.
    pub fn new() -> Self {
        let key: Key<Aes256Gcm> = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Seal and retain credentials for an agent, replacing any previous
    /// entry.
    pub async fn store(&self, agent_id: &str, credentials: &ConnectCredentials) -> SwarmResult<()> {
        let plaintext = serde_json::to_vec(credentials)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| SwarmError::Vault("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);

        let mut entries = self.entries.write().await;
        entries.insert(agent_id.to_string(), blob);
        Ok(())
    }

    /// Decrypt the retained credentials for an agent, if any.
    pub async fn recall(&self, agent_id: &str) -> SwarmResult<Option<ConnectCredentials>> {
        let blob = {
            let entries = self.entries.read().await;
            match entries.get(agent_id) {
                Some(blob) => blob.clone(),
                None => return Ok(None),
            }
        };
        if blob.len() < NONCE_LEN {
            return Err(SwarmError::Vault("stored blob too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SwarmError::Vault("decryption failed".to_string()))?;
        let credentials = serde_json::from_slice(&plaintext)?;
        Ok(Some(credentials))
    }

    /// Drop an agent's entry.
    pub async fn forget(&self, agent_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(agent_id);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

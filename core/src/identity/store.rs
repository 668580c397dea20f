// Per-address login material storage

use super::keys::{derive_login_material, AccountKeys};
use crate::store::backend::StorageBackend;
use anyhow::{bail, Result};
use std::sync::Arc;
use zeroize::Zeroizing;

const SESSION_PREFIX: &[u8] = b"session_secret_";

/// Holds the hashed login signature for each host account address.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn StorageBackend>,
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn session_key(address: &str) -> Vec<u8> {
    let mut key = SESSION_PREFIX.to_vec();
    key.extend_from_slice(normalize(address).as_bytes());
    key
}

impl SessionStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { db: backend }
    }

    /// Store material derived from `signature` unless the address already has some.
    ///
    /// Returns `true` when new material was written.
    pub fn login(&self, address: &str, signature: &[u8]) -> Result<bool> {
        if self.contains(address)? {
            tracing::debug!("Address {} already logged in", normalize(address));
            return Ok(false);
        }

        let material = derive_login_material(signature);
        self.db
            .put(&session_key(address), material.as_slice())
            .map_err(|e| anyhow::anyhow!(e))?;
        self.db.flush().map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!("🔑 Stored login material for {}", normalize(address));
        Ok(true)
    }

    pub fn contains(&self, address: &str) -> Result<bool> {
        Ok(self
            .db
            .get(&session_key(address))
            .map_err(|e| anyhow::anyhow!(e))?
            .is_some())
    }

    /// Load the account keys for `address`, if logged in.
    pub fn load(&self, address: &str) -> Result<Option<AccountKeys>> {
        let Some(bytes) = self
            .db
            .get(&session_key(address))
            .map_err(|e| anyhow::anyhow!(e))?
        else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(bytes);

        if bytes.len() != 32 {
            bail!("Corrupt login material for {}", normalize(address));
        }
        let mut material = Zeroizing::new([0u8; 32]);
        material.copy_from_slice(&bytes);
        Ok(Some(AccountKeys::from_login_material(&material)))
    }

    /// Remove material for `address`. Returns whether anything was removed.
    pub fn logout(&self, address: &str) -> Result<bool> {
        let existed = self.contains(address)?;
        if existed {
            self.db
                .remove(&session_key(address))
                .map_err(|e| anyhow::anyhow!(e))?;
            self.db.flush().map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!("Cleared login material for {}", normalize(address));
        }
        Ok(existed)
    }

    /// Addresses with stored material.
    pub fn addresses(&self) -> Result<Vec<String>> {
        let entries = self
            .db
            .scan_prefix(SESSION_PREFIX)
            .map_err(|e| anyhow::anyhow!(e))?;

        entries
            .into_iter()
            .map(|(key, _)| -> Result<String> {
                Ok(String::from_utf8(key[SESSION_PREFIX.len()..].to_vec())?)
            })
            .collect()
    }
}

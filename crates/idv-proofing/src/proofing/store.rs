use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::domain::ResultId;
use super::encryption::{
    EncryptedPayload, EncryptionContext, EncryptionError, PayloadEncryptor,
};
use super::result::ProofingResult;

/// Key/value storage with per-entry expiry. Expired entries must never be returned.
pub trait ResultBackend: Send + Sync {
    fn write(&self, key: &str, value: EncryptedPayload, ttl: Duration) -> Result<(), StoreError>;
    fn read(&self, key: &str) -> Result<Option<EncryptedPayload>, StoreError>;
    /// Reads and deletes in one step.
    fn take(&self, key: &str) -> Result<Option<EncryptedPayload>, StoreError>;
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
    #[error("stored result could not be decoded: {0}")]
    Encryption(#[from] EncryptionError),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: EncryptedPayload,
    expires_at: Instant,
}

/// Process-local backend on tokio's clock.
#[derive(Debug, Default, Clone)]
pub struct InMemoryResultBackend {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl InMemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let guard = self.lock()?;
        Ok(guard.values().filter(|entry| entry.expires_at > now).count())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("result map mutex poisoned".to_string()))
    }
}

impl ResultBackend for InMemoryResultBackend {
    fn write(&self, key: &str, value: EncryptedPayload, ttl: Duration) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<EncryptedPayload>, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        match guard.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn take(&self, key: &str) -> Result<Option<EncryptedPayload>, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        Ok(guard
            .remove(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value))
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at > now);
        Ok(before - guard.len())
    }
}

/// Encrypts results at rest and keys them by `result_id`.
pub struct ResultStore<B> {
    backend: Arc<B>,
    encryptor: PayloadEncryptor,
    ttl: Duration,
}

impl<B> Clone for ResultStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            encryptor: self.encryptor.clone(),
            ttl: self.ttl,
        }
    }
}

impl<B> ResultStore<B>
where
    B: ResultBackend + 'static,
{
    pub fn new(backend: Arc<B>, encryptor: PayloadEncryptor, ttl: Duration) -> Self {
        Self {
            backend,
            encryptor,
            ttl,
        }
    }

    pub fn key_for(result_id: &ResultId) -> String {
        format!("idv:proofing-result:{}", result_id.as_str())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Writes (or overwrites) the single record for `result.result_id`.
    pub fn store(&self, result: &ProofingResult) -> Result<(), StoreError> {
        let sealed = self
            .encryptor
            .seal(result, EncryptionContext::ProofingResult)?;
        self.backend
            .write(&Self::key_for(&result.result_id), sealed, self.ttl)
    }

    pub fn load(&self, result_id: &ResultId) -> Result<Option<ProofingResult>, StoreError> {
        self.backend
            .read(&Self::key_for(result_id))?
            .map(|payload| self.open(&payload))
            .transpose()
    }

    /// Read-once retrieval. A second call for the same id returns `None`.
    pub fn take(&self, result_id: &ResultId) -> Result<Option<ProofingResult>, StoreError> {
        self.backend
            .take(&Self::key_for(result_id))?
            .map(|payload| self.open(&payload))
            .transpose()
    }

    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.backend.purge_expired()
    }

    fn open(&self, payload: &EncryptedPayload) -> Result<ProofingResult, StoreError> {
        Ok(self
            .encryptor
            .open(payload, EncryptionContext::ProofingResult)?)
    }
}

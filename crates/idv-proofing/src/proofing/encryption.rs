//! Symmetric encryption for the web-tier → worker handoff and for results at rest.
//!
//! Wire format: `base64(version || nonce (12 bytes) || ciphertext || tag (16 bytes))`.
//! The [`EncryptionContext`] label is authenticated as associated data, so a payload sealed
//! for one purpose does not open under another.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const FORMAT_VERSION: u8 = 1;

/// Purpose a payload was sealed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionContext {
    ProofingArguments,
    ProofingResult,
}

impl EncryptionContext {
    fn aad(&self) -> &'static [u8] {
        match self {
            EncryptionContext::ProofingArguments => b"background-proofing-arguments",
            EncryptionContext::ProofingResult => b"proofing-result",
        }
    }
}

/// Base64 ciphertext as it travels through the queue and the result store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedPayload(pub String);

impl EncryptedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedPayload({} chars)", self.0.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("payload is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),
    #[error("payload is truncated")]
    Truncated,
    #[error("encryption failed")]
    Encrypt,
    #[error("payload failed authentication")]
    Authentication,
    /// Carries only the position and category; serde messages can echo plaintext values.
    #[error("payload is malformed ({category:?} error at line {line} column {column})")]
    Malformed {
        line: usize,
        column: usize,
        category: Category,
    },
}

impl From<serde_json::Error> for EncryptionError {
    fn from(error: serde_json::Error) -> Self {
        EncryptionError::Malformed {
            line: error.line(),
            column: error.column(),
            category: error.classify(),
        }
    }
}

/// AES-256-GCM encryptor with a current key and a queue of retired keys still accepted
/// for decryption.
#[derive(Clone)]
pub struct PayloadEncryptor {
    ciphers: Arc<Vec<Aes256Gcm>>,
}

impl PayloadEncryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            ciphers: Arc::new(vec![Aes256Gcm::new(key.into())]),
        }
    }

    pub fn with_retired_keys(self, retired: &[[u8; KEY_LEN]]) -> Self {
        let mut ciphers = self.ciphers.as_ref().clone();
        ciphers.extend(retired.iter().map(|key| Aes256Gcm::new(key.into())));
        Self {
            ciphers: Arc::new(ciphers),
        }
    }

    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        context: EncryptionContext,
    ) -> Result<EncryptedPayload, EncryptionError> {
        let cipher = self.ciphers.first().ok_or(EncryptionError::Encrypt)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: context.aad(),
                },
            )
            .map_err(|_| EncryptionError::Encrypt)?;

        let mut framed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        framed.push(FORMAT_VERSION);
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);

        Ok(EncryptedPayload(STANDARD.encode(framed)))
    }

    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        context: EncryptionContext,
    ) -> Result<Vec<u8>, EncryptionError> {
        let framed = STANDARD.decode(payload.as_str().trim())?;
        let (version, rest) = framed.split_first().ok_or(EncryptionError::Truncated)?;
        if *version != FORMAT_VERSION {
            return Err(EncryptionError::UnsupportedVersion(*version));
        }
        if rest.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::Truncated);
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        self.ciphers
            .iter()
            .find_map(|cipher| {
                cipher
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad: context.aad(),
                        },
                    )
                    .ok()
            })
            .ok_or(EncryptionError::Authentication)
    }

    /// Serializes `value` to JSON and encrypts it.
    pub fn seal<T: Serialize>(
        &self,
        value: &T,
        context: EncryptionContext,
    ) -> Result<EncryptedPayload, EncryptionError> {
        let plaintext = serde_json::to_vec(value)?;
        self.encrypt(&plaintext, context)
    }

    pub fn open<T: DeserializeOwned>(
        &self,
        payload: &EncryptedPayload,
        context: EncryptionContext,
    ) -> Result<T, EncryptionError> {
        let plaintext = self.decrypt(payload, context)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl fmt::Debug for PayloadEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadEncryptor")
            .field("keys", &self.ciphers.len())
            .finish()
    }
}

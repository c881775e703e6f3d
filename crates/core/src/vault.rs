//! AES-256-GCM vault for marketplace credentials. Output layout is
//! `base64(nonce || ciphertext || tag)` with a fresh random nonce per call.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("vault key must be exactly {KEY_LEN} bytes, got {0}")]
    InvalidKeySize(usize),
    #[error("ciphertext is not valid vault output")]
    InvalidCiphertext,
    #[error("ciphertext failed authentication")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
}

pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKeySize(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InvalidKeySize(key.len()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, VaultError> {
        let payload = BASE64.decode(encoded).map_err(|_| VaultError::InvalidCiphertext)?;
        if payload.len() <= NONCE_LEN {
            return Err(VaultError::InvalidCiphertext);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext =
            self.cipher.decrypt(nonce, ciphertext).map_err(|_| VaultError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Payload encryption.
//!
//! The cached eids envelope is only ever persisted as ciphertext. The cipher
//! is injected through [`PayloadCipher`]; [`ChaChaCipher`] is the default:
//!
//! - **Key**: SHA-256 of a passphrase
//! - **Encryption**: ChaCha20-Poly1305 with a random 12-byte nonce
//! - **Encoding**: base64(nonce || ciphertext || tag)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::record::{CachedData, EidsEnvelope};

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Passphrase of the default cipher.
pub const DEFAULT_PASSPHRASE: &str = "intentIqId";

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("decryption failed (tampered or wrong key)")]
    Decrypt,
}

/// Symmetric cipher for the cached identity payload.
pub trait PayloadCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

pub struct ChaChaCipher {
    key: [u8; 32],
}

impl ChaChaCipher {
    /// Derive the key from a passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    #[must_use]
    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl Default for ChaChaCipher {
    fn default() -> Self {
        Self::from_passphrase(DEFAULT_PASSPHRASE)
    }
}

impl PayloadCipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::Malformed(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Malformed(format!(
                "expected more than {} bytes, got {}",
                NONCE_LEN,
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plain).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

/// Encrypt an eids envelope into its stored form.
pub fn seal_eids(cipher: &dyn PayloadCipher, envelope: &EidsEnvelope) -> Result<CachedData, CipherError> {
    let json = serde_json::to_string(envelope).map_err(|e| CipherError::Encrypt(e.to_string()))?;
    Ok(CachedData::Ciphertext(cipher.encrypt(&json)?))
}

/// Decrypt a stored payload. Anything that is not valid ciphertext of an
/// envelope reads as "no identifiers".
#[must_use]
pub fn open_eids(cipher: &dyn PayloadCipher, data: &CachedData) -> Option<EidsEnvelope> {
    let ciphertext = data.ciphertext()?;
    let plain = match cipher.decrypt(ciphertext) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Cached identity payload could not be decrypted");
            crate::metrics::record_decode_failure("payload");
            return None;
        }
    };
    match serde_json::from_str::<EidsEnvelope>(&plain) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(error = %e, "Decrypted identity payload is not an eids envelope");
            crate::metrics::record_decode_failure("payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = ChaChaCipher::default();
        let sealed = cipher.encrypt(r#"{"eids":[]}"#).unwrap();
        assert_ne!(sealed, r#"{"eids":[]}"#);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), r#"{"eids":[]}"#);
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let cipher = ChaChaCipher::default();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = ChaChaCipher::from_passphrase("one").encrypt("secret").unwrap();
        let result = ChaChaCipher::from_passphrase("two").decrypt(&sealed);
        assert!(matches!(result, Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_malformed_ciphertext() {
        let cipher = ChaChaCipher::default();
        assert!(matches!(cipher.decrypt("not base64!!"), Err(CipherError::Malformed(_))));
        assert!(matches!(cipher.decrypt("AAAA"), Err(CipherError::Malformed(_))));
    }

    #[test]
    fn test_seal_and_open_eids() {
        let cipher = ChaChaCipher::default();
        let envelope = EidsEnvelope::new(vec![json!({"source": "intentiq.com", "uids": [{"id": "abc"}]})]);
        let stored = seal_eids(&cipher, &envelope).unwrap();

        let text = serde_json::to_string(&stored).unwrap();
        assert!(!text.contains("abc"));

        assert_eq!(open_eids(&cipher, &stored), Some(envelope));
    }

    #[test]
    fn test_open_non_ciphertext_is_none() {
        let cipher = ChaChaCipher::default();
        assert!(open_eids(&cipher, &CachedData::InvalidId).is_none());
        assert!(open_eids(&cipher, &CachedData::Empty).is_none());
        assert!(open_eids(&cipher, &CachedData::Ciphertext("garbage".into())).is_none());
    }
}

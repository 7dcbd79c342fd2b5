//! Symmetric encryption of custodial secrets using ChaCha20-Poly1305 AEAD.
//!
//! The 32-byte key is derived as `SHA-256(platform secret)` — one canonical
//! derivation for every encryption context. Each call draws a fresh random
//! 12-byte nonce, prepended to the ciphertext, so a sealed blob is
//! self-contained and hex-encoded for storage.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use custodia_types::{CustodiaError, Result};

/// ChaCha20-Poly1305 nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
const TAG_SIZE: usize = 16;

/// Encrypts and decrypts custodial private keys at rest.
pub struct KeyVault {
    key: [u8; 32],
}

impl KeyVault {
    /// Derive the vault key from the platform secret.
    #[must_use]
    pub fn new(platform_secret: &str) -> Self {
        let digest = Sha256::digest(platform_secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Seal a plaintext secret. Returns hex of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CustodiaError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Open a sealed blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, sealed_hex: &str) -> Result<String> {
        let sealed = hex::decode(sealed_hex).map_err(|e| CustodiaError::MalformedCiphertext {
            reason: format!("invalid hex: {e}"),
        })?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CustodiaError::MalformedCiphertext {
                reason: format!("sealed blob too short: {} bytes", sealed.len()),
            });
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                CustodiaError::DecryptionFailed("authentication failed".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| CustodiaError::DecryptionFailed(format!("invalid utf-8: {e}")))
    }
}

impl Drop for KeyVault {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let vault = KeyVault::new("platform-secret");
        let sealed = vault.encrypt("deadbeef0123").unwrap();
        assert_eq!(vault.decrypt(&sealed).unwrap(), "deadbeef0123");
    }

    #[test]
    fn sealed_blob_is_nonce_unique() {
        let vault = KeyVault::new("platform-secret");
        let a = vault.encrypt("same-secret").unwrap();
        let b = vault.encrypt("same-secret").unwrap();
        assert_ne!(a, b, "fresh nonce per call must change the blob");
    }

    #[test]
    fn wrong_platform_secret_fails_auth() {
        let vault = KeyVault::new("platform-secret");
        let sealed = vault.encrypt("deadbeef").unwrap();
        let other = KeyVault::new("different-secret");
        let err = other.decrypt(&sealed).unwrap_err();
        assert!(matches!(err, CustodiaError::DecryptionFailed(_)));
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let vault = KeyVault::new("platform-secret");
        let sealed = vault.encrypt("deadbeef").unwrap();
        let mut bytes = hex::decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = vault.decrypt(&hex::encode(bytes)).unwrap_err();
        assert!(matches!(err, CustodiaError::DecryptionFailed(_)));
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let vault = KeyVault::new("platform-secret");
        let err = vault.decrypt("00ff00").unwrap_err();
        assert!(matches!(err, CustodiaError::MalformedCiphertext { .. }));
    }

    #[test]
    fn non_hex_blob_is_malformed() {
        let vault = KeyVault::new("platform-secret");
        let err = vault.decrypt("not hex at all!").unwrap_err();
        assert!(matches!(err, CustodiaError::MalformedCiphertext { .. }));
    }
}

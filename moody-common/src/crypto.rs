//! Symmetric encryption for provider tokens at rest
//!
//! Tokens are sealed with AES-256-GCM under a process-wide key. The stored
//! form is base64(nonce || ciphertext) so a single TEXT column holds both.

use crate::{Error, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts provider tokens
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher([REDACTED])")
    }
}

impl TokenCipher {
    /// Build from raw key bytes (must be exactly 32 bytes)
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::Config(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build from the base64 form used in configuration
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let key = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Config(format!("Encryption key is not valid base64: {}", e)))?;
        Self::new(&key)
    }

    /// Generate a random key, base64 encoded (for first-time setup and tests)
    pub fn generate_key() -> String {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        general_purpose::STANDARD.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Internal("Token encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        let bytes = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| Error::Internal(format!("Stored token is not valid base64: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(Error::Internal("Stored token is truncated".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Internal("Token decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Internal(format!("Decrypted token is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::from_base64(&TokenCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt_returns_plaintext() {
        let cipher = cipher();
        let sealed = cipher.encrypt("BQD-access-token").unwrap();
        assert_ne!(sealed, "BQD-access-token");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "BQD-access-token");
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = cipher().encrypt("secret").unwrap();
        assert!(cipher().decrypt(&sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let cipher = cipher();
        let sealed = cipher.encrypt("secret").unwrap();
        let mut bytes = general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = general_purpose::STANDARD.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert!(TokenCipher::new(&[0u8; 16]).is_err());
        assert!(TokenCipher::from_base64("not base64!!").is_err());
        assert!(TokenCipher::new(&[7u8; 32]).is_ok());
    }
}

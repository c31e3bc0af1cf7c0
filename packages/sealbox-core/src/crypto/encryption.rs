//! # Encryption Module
//!
//! AES-256-GCM encryption of file contents under the per-package session key.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FILE ENCRYPTION FLOW                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                                                │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  nonce = 12 random bytes (fresh for every call)             │       │
//! │  │  AES-256-GCM-Encrypt(session_key, nonce, plaintext)         │       │
//! │  │           ↓                                                  │       │
//! │  │  ciphertext || 16-byte tag, nonce stored next to it         │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  RECIPIENT                                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM-Decrypt(session_key, nonce, ciphertext || tag) │       │
//! │  │           ↓                                                  │       │
//! │  │  Plaintext, or IntegrityError if anything was altered       │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only the holder of the session key can read the file |
//! | Integrity | Any modification of ciphertext, tag or nonce is detected |
//! | All-or-nothing | Decryption yields the full plaintext or nothing |

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::SymmetricKey;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Cipher identifier carried in package metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// AES-256 in Galois/Counter Mode with a 128-bit tag
    Aes256Gcm,
}

impl CipherAlgorithm {
    /// Wire identifier
    pub fn id(&self) -> u8 {
        match self {
            CipherAlgorithm::Aes256Gcm => 1,
        }
    }

    /// Look up a wire identifier
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(CipherAlgorithm::Aes256Gcm),
            _ => None,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "AES-256-GCM",
        }
    }
}

/// A nonce (IV) for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!** Every call to [`encrypt`]
/// draws a new random nonce. Each package also has its own session key,
/// so a key never sees more than one nonce in practice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| Error::Entropy)?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 12 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().map_err(|_| {
            Error::Cipher(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// Encrypt file bytes with AES-256-GCM
///
/// ## Returns
///
/// Tuple of (ciphertext_with_tag, nonce)
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<(Vec<u8>, Nonce)> {
    let nonce = Nonce::random()?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Cipher(format!("Invalid key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), plaintext)
        .map_err(|_| Error::Cipher("plaintext too long for AES-GCM".into()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt file bytes with AES-256-GCM
///
/// ## Errors
///
/// - `Cipher` if the ciphertext is shorter than the authentication tag
/// - `Integrity` if the ciphertext, tag, nonce or key is wrong
pub fn decrypt(ciphertext: &[u8], nonce: &Nonce, key: &SymmetricKey) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Cipher(format!(
            "ciphertext must be at least {} bytes, got {}",
            TAG_SIZE,
            ciphertext.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Cipher(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), ciphertext)
        .map_err(|_| Error::Integrity)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_symmetric_key;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let plaintext = b"Hello, World!";

        let (ciphertext, nonce) = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&ciphertext, &nonce, &key).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_symmetric_key(256).unwrap();

        let (ciphertext, nonce) = encrypt(b"", &key).unwrap();
        let decrypted = decrypt(&ciphertext, &nonce, &key).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_encrypt_decrypt_binary() {
        let key = generate_symmetric_key(256).unwrap();
        let plaintext: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();

        let (ciphertext, nonce) = encrypt(&plaintext, &key).unwrap();

        assert_eq!(decrypt(&ciphertext, &nonce, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let (mut ciphertext, nonce) = encrypt(b"Hello, World!", &key).unwrap();

        ciphertext[0] ^= 0x01;

        assert!(matches!(
            decrypt(&ciphertext, &nonce, &key),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let (mut ciphertext, nonce) = encrypt(b"42", &key).unwrap();

        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x80;

        assert!(matches!(
            decrypt(&ciphertext, &nonce, &key),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let (ciphertext, _) = encrypt(b"42", &key).unwrap();

        let other = Nonce::from_bytes([0u8; NONCE_SIZE]);
        assert!(matches!(
            decrypt(&ciphertext, &other, &key),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SymmetricKey::from_bytes([42u8; 32]);
        let key2 = SymmetricKey::from_bytes([99u8; 32]);

        let (ciphertext, nonce) = encrypt(b"secret", &key1).unwrap();
        let result = decrypt(&ciphertext, &nonce, &key2);

        assert!(matches!(result, Err(Error::Integrity)));
    }

    #[test]
    fn test_truncated_ciphertext_is_cipher_error() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let nonce = Nonce::from_bytes([1u8; NONCE_SIZE]);

        assert!(matches!(
            decrypt(&[0u8; TAG_SIZE - 1], &nonce, &key),
            Err(Error::Cipher(_))
        ));
    }

    #[test]
    fn test_malformed_nonce_is_cipher_error() {
        assert!(matches!(Nonce::from_slice(&[0u8; 8]), Err(Error::Cipher(_))));
        assert!(Nonce::from_slice(&[0u8; NONCE_SIZE]).is_ok());
    }

    #[test]
    fn test_different_nonces_produce_different_ciphertext() {
        let key = SymmetricKey::from_bytes([42u8; 32]);

        let (ct1, n1) = encrypt(b"Hello, World!", &key).unwrap();
        let (ct2, n2) = encrypt(b"Hello, World!", &key).unwrap();

        assert_ne!(n1, n2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_algorithm_ids() {
        assert_eq!(
            CipherAlgorithm::from_id(CipherAlgorithm::Aes256Gcm.id()),
            Some(CipherAlgorithm::Aes256Gcm)
        );
        assert_eq!(CipherAlgorithm::from_id(7), None);
    }
}

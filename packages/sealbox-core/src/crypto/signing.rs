//! # Digital Signatures Module
//!
//! RSA signatures over content digests, proving which key holder produced
//! a package.
//!
//! ## Signature Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNING (SENDER)                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  plaintext ──► SHA-256 ──► Digest (32 bytes)                           │
//! │                               │                                         │
//! │                               ▼                                         │
//! │        RSASSA-PKCS1-v1_5(sender private key, DigestInfo(SHA-256))      │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                  Signature (modulus size, 256 bytes)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       VERIFICATION (RECEIVER)                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  decrypted bytes ──► SHA-256 ──► Digest'                               │
//! │                                                                         │
//! │  verify(sender public key, Digest', Signature) ──► true / false        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why PKCS#1 v1.5?
//!
//! Signing the same digest with the same key always yields the same bytes,
//! which keeps packages reproducible for a given session and lets tests
//! compare signatures directly. Key wrapping, where padding oracles matter,
//! uses OAEP instead (see the `wrap` module).

use rand::rngs::OsRng;
use rsa::Pkcs1v15Sign;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::{Digest, PrivateKey, PublicKey};
use crate::error::{Error, Result};

/// Largest signature accepted (8192-bit modulus)
pub const MAX_SIGNATURE_SIZE: usize = 1024;

/// An RSA signature; its length equals the signer's modulus size
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex_vec")] Vec<u8>);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signature holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        hex::decode(hex_str.trim())
            .map(Self)
            .map_err(|e| Error::Format(format!("invalid signature hex: {}", e)))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sign a digest with RSASSA-PKCS1-v1_5 / SHA-256
///
/// The private-key operation is blinded; the output is still deterministic.
pub fn sign(digest: &Digest, private_key: &PrivateKey) -> Result<Signature> {
    private_key
        .inner()
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes())
        .map(Signature)
        .map_err(|e| Error::Sign(e.to_string()))
}

/// Verify a signature over a digest
///
/// Returns `false` on any mismatch, including a signature of the wrong
/// length. Never errors.
pub fn verify(digest: &Digest, signature: &Signature, public_key: &PublicKey) -> bool {
    if signature.len() != public_key.size() {
        return false;
    }

    public_key
        .inner()
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            digest.as_bytes(),
            signature.as_bytes(),
        )
        .is_ok()
}

/// Serde helper for variable-length byte strings as hex
mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

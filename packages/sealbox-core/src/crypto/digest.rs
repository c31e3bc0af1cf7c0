//! # Content Digests
//!
//! SHA-256 fingerprints of plaintext file bytes. The sender signs the
//! digest; the receiver recomputes it from the decrypted bytes and compares.

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Size of a digest in bytes (256 bits)
pub const DIGEST_SIZE: usize = 32;

/// Block size used when hashing a stream
const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Hash function identifier carried in package metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256
    Sha256,
}

impl DigestAlgorithm {
    /// Wire identifier
    pub fn id(&self) -> u8 {
        match self {
            DigestAlgorithm::Sha256 => 1,
        }
    }

    /// Look up a wire identifier
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }
}

/// A SHA-256 digest
///
/// Equality is constant-time.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex_bytes")] [u8; DIGEST_SIZE]);

impl Digest {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; DIGEST_SIZE] = slice.try_into().map_err(|_| {
            Error::Format(format!(
                "digest must be {} bytes, got {}",
                DIGEST_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Encode as lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| Error::Format(format!("invalid digest hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash a byte slice
pub fn hash(bytes: &[u8]) -> Digest {
    Digest(Sha256::digest(bytes).into())
}

/// Hash everything a reader yields, one block at a time
///
/// Memory use is bounded by the block size regardless of input length.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<Digest> {
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; READ_BLOCK_SIZE];
    let mut total: u64 = 0;

    loop {
        let read = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };
        hasher.update(&block[..read]);
        total += read as u64;
    }

    tracing::trace!(bytes = total, "hashed stream");
    Ok(Digest(hasher.finalize().into()))
}

/// Serde helper for serializing byte arrays as hex
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DIGEST_SIZE;

    pub fn serialize<S>(bytes: &[u8; DIGEST_SIZE], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; DIGEST_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid digest length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

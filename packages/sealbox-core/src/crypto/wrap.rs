//! # Key Wrapping
//!
//! Protects the AES session key for transport by encrypting it under the
//! recipient's RSA public key with RSA-OAEP (SHA-256, MGF1-SHA-256).
//!
//! Unwrap failures collapse into a single [`Error::Unwrap`]: the caller
//! cannot tell a wrong key from a bad padding block or a truncated input.

use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{PrivateKey, PublicKey, SymmetricKey};
use crate::error::{Error, Result};

/// Output size of the OAEP hash (SHA-256)
const OAEP_HASH_SIZE: usize = 32;

/// Largest wrapped key accepted (8192-bit modulus)
pub const MAX_WRAPPED_KEY_SIZE: usize = 1024;

/// A session key encrypted for one recipient
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
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

    /// Whether the wrapped key holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

/// Maximum number of bytes OAEP-SHA-256 can carry under this key
pub fn max_wrap_payload(public_key: &PublicKey) -> usize {
    public_key.size().saturating_sub(2 * OAEP_HASH_SIZE + 2)
}

/// Wrap a session key for the recipient
pub fn wrap(key: &SymmetricKey, public_key: &PublicKey) -> Result<WrappedKey> {
    wrap_payload(key.as_bytes(), public_key).map(WrappedKey)
}

/// Recover a session key with the recipient's private key
pub fn unwrap(wrapped: &WrappedKey, private_key: &PrivateKey) -> Result<SymmetricKey> {
    let bytes = private_key
        .inner()
        .decrypt(Oaep::new::<Sha256>(), wrapped.as_bytes())
        .map(Zeroizing::new)
        .map_err(|_| Error::Unwrap)?;

    SymmetricKey::from_slice(&bytes).map_err(|_| Error::Unwrap)
}

fn wrap_payload(payload: &[u8], public_key: &PublicKey) -> Result<Vec<u8>> {
    let limit = max_wrap_payload(public_key);
    if payload.len() > limit {
        return Err(Error::Wrap(format!(
            "{} byte payload exceeds the {} byte OAEP limit of a {}-bit key",
            payload.len(),
            limit,
            public_key.bits()
        )));
    }

    public_key
        .inner()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
        .map_err(|e| Error::Wrap(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_symmetric_key;
    use crate::testing::{ALICE, BOB};

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let key = generate_symmetric_key(256).unwrap();

        let wrapped = wrap(&key, BOB.public()).unwrap();
        let unwrapped = unwrap(&wrapped, BOB.private()).unwrap();

        assert_eq!(wrapped.len(), BOB.public().size());
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_wrap_is_randomized() {
        let key = SymmetricKey::from_bytes([5u8; 32]);

        let w1 = wrap(&key, BOB.public()).unwrap();
        let w2 = wrap(&key, BOB.public()).unwrap();

        assert_ne!(w1, w2);
    }

    #[test]
    fn test_unwrap_with_wrong_key_fails() {
        let key = generate_symmetric_key(256).unwrap();
        let wrapped = wrap(&key, BOB.public()).unwrap();

        assert!(matches!(unwrap(&wrapped, ALICE.private()), Err(Error::Unwrap)));
    }

    #[test]
    fn test_unwrap_tampered_fails() {
        let key = generate_symmetric_key(256).unwrap();
        let wrapped = wrap(&key, BOB.public()).unwrap();

        let mut bytes = wrapped.as_bytes().to_vec();
        bytes[17] ^= 0x01;

        assert!(matches!(
            unwrap(&WrappedKey::from_bytes(bytes), BOB.private()),
            Err(Error::Unwrap)
        ));
    }

    #[test]
    fn test_unwrap_malformed_lengths_fail_generically() {
        for bytes in [vec![], vec![0u8; 10], vec![0xFFu8; 256], vec![0u8; 512]] {
            let err = unwrap(&WrappedKey::from_bytes(bytes), BOB.private()).unwrap_err();
            assert!(matches!(err, Error::Unwrap));
            assert_eq!(err.to_string(), Error::Unwrap.to_string());
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let limit = max_wrap_payload(BOB.public());
        assert_eq!(limit, 256 - 66);

        assert!(wrap_payload(&vec![1u8; limit], BOB.public()).is_ok());
        assert!(matches!(
            wrap_payload(&vec![1u8; limit + 1], BOB.public()),
            Err(Error::Wrap(_))
        ));
    }
}

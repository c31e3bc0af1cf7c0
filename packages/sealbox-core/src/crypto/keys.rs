//! # Key Management
//!
//! Generation, import and export of the key material used by the engine.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyPair (RSA, 2048-bit default, e = 65537)                            │
//! │  ───────────────────────────────────────────                            │
//! │  • PrivateKey: signs digests, unwraps session keys                     │
//! │    (zeroized on drop, exported only as PKCS#8 for local storage)       │
//! │  • PublicKey: verifies signatures, wraps session keys                  │
//! │    (SPKI or PKCS#1, PEM or DER, shared freely)                         │
//! │                                                                         │
//! │  SymmetricKey (AES-256)                                                │
//! │  ──────────────────────                                                 │
//! │  • 32 random bytes from the OS CSPRNG                                  │
//! │  • One per package, zeroized on drop                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest as _, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Smallest RSA modulus the engine will generate or accept
pub const MIN_RSA_BITS: u32 = 2048;

/// Largest RSA modulus the engine will generate or accept
pub const MAX_RSA_BITS: u32 = 8192;

/// RSA modulus size used when the caller has no preference
pub const DEFAULT_RSA_BITS: u32 = 2048;

/// Public exponent for every generated key pair
pub const RSA_PUBLIC_EXPONENT: u64 = 65537;

/// Size of the symmetric session key in bytes (256 bits)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

const PEM_PREFIX: &str = "-----BEGIN";

// ============================================================================
// RSA KEYS
// ============================================================================

/// An RSA key pair
///
/// The private half never leaves this struct except through an explicit
/// PKCS#8 export, and is zeroized when dropped.
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair around an existing private key
    pub fn from_private(private: PrivateKey) -> Self {
        let public = PublicKey(RsaPublicKey::from(&private.0));
        Self { private, public }
    }

    /// The private half
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// The public half
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Modulus size in bits
    pub fn bits(&self) -> u32 {
        self.public.bits()
    }

    /// Keep only the private half
    pub fn into_private(self) -> PrivateKey {
        self.private
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// RSA private key
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Parse a PEM private key (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| Error::InvalidKey("unparsable PEM private key".into()))?;
        Self::checked(key)
    }

    /// Parse a DER private key (PKCS#8 or PKCS#1)
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
            .map_err(|_| Error::InvalidKey("unparsable DER private key".into()))?;
        Self::checked(key)
    }

    /// Parse either encoding, detecting PEM by its armor line
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match pem_text(bytes) {
            Some(text) => Self::from_pem(text),
            None => Self::from_der(bytes),
        }
    }

    /// Export as PKCS#8 PEM
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure local storage. Never log or transmit it.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Internal(format!("PKCS#8 PEM export failed: {}", e)))
    }

    /// Export as PKCS#8 DER
    pub fn to_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .0
            .to_pkcs8_der()
            .map_err(|e| Error::Internal(format!("PKCS#8 DER export failed: {}", e)))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> u32 {
        self.0.n().bits() as u32
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }

    fn checked(key: RsaPrivateKey) -> Result<Self> {
        check_modulus_bits(key.n().bits())?;
        key.validate()
            .map_err(|_| Error::InvalidKey("inconsistent RSA private key".into()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// RSA public key
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a PEM public key (SPKI `PUBLIC KEY` or PKCS#1 `RSA PUBLIC KEY`)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| Error::InvalidKey("unparsable PEM public key".into()))?;
        Self::checked(key)
    }

    /// Parse a DER public key (SPKI or PKCS#1)
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
            .map_err(|_| Error::InvalidKey("unparsable DER public key".into()))?;
        Self::checked(key)
    }

    /// Parse either encoding, detecting PEM by its armor line
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match pem_text(bytes) {
            Some(text) => Self::from_pem(text),
            None => Self::from_der(bytes),
        }
    }

    /// Export as SPKI PEM
    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Internal(format!("SPKI PEM export failed: {}", e)))
    }

    /// Export as SPKI DER
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| Error::Internal(format!("SPKI DER export failed: {}", e)))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> u32 {
        self.0.n().bits() as u32
    }

    /// Modulus size in bytes; also the length of signatures and wrapped keys
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Hex SHA-256 over the big-endian modulus followed by the exponent
    ///
    /// Safe to log and display; used to identify keys without printing them.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.n().to_bytes_be());
        hasher.update(self.0.e().to_bytes_be());
        hex::encode(hasher.finalize())
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }

    fn checked(key: RsaPublicKey) -> Result<Self> {
        check_modulus_bits(key.n().bits())?;
        Ok(Self(key))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn check_modulus_bits(bits: usize) -> Result<()> {
    if bits < MIN_RSA_BITS as usize || bits > MAX_RSA_BITS as usize {
        return Err(Error::InvalidKey(format!(
            "RSA modulus must be {}-{} bits, got {}",
            MIN_RSA_BITS, MAX_RSA_BITS, bits
        )));
    }
    Ok(())
}

fn pem_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|text| text.trim_start().starts_with(PEM_PREFIX))
}

/// Generate a fresh RSA key pair with public exponent 65537
///
/// RSA generation is the most expensive step of the sender pipeline: expect
/// tens to hundreds of milliseconds for 2048 bits in an optimized build.
pub fn generate_rsa_keypair(bits: u32) -> Result<KeyPair> {
    if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
        return Err(Error::KeyGen(format!(
            "RSA key size must be {}-{} bits, got {}",
            MIN_RSA_BITS, MAX_RSA_BITS, bits
        )));
    }
    if bits % 8 != 0 {
        return Err(Error::KeyGen(format!(
            "RSA key size must be a multiple of 8, got {}",
            bits
        )));
    }

    let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut OsRng, bits as usize, &exponent)
        .map_err(|e| Error::KeyGen(e.to_string()))?;

    let pair = KeyPair::from_private(PrivateKey(private));
    tracing::debug!(bits, fingerprint = %pair.public().fingerprint(), "generated RSA key pair");
    Ok(pair)
}

// ============================================================================
// SYMMETRIC KEY
// ============================================================================

/// AES-256 session key
///
/// Zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SYMMETRIC_KEY_SIZE] = slice.try_into().map_err(|_| {
            Error::Cipher(format!(
                "symmetric key must be {} bytes, got {}",
                SYMMETRIC_KEY_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    pub(crate) fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Draw a new session key from the OS CSPRNG
///
/// Only 256-bit keys are supported.
pub fn generate_symmetric_key(bits: u32) -> Result<SymmetricKey> {
    if bits as usize != SYMMETRIC_KEY_SIZE * 8 {
        return Err(Error::KeyGen(format!(
            "symmetric key size must be {} bits, got {}",
            SYMMETRIC_KEY_SIZE * 8,
            bits
        )));
    }

    let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
    OsRng.try_fill_bytes(&mut bytes).map_err(|_| Error::Entropy)?;
    let key = SymmetricKey(bytes);
    bytes.zeroize();
    Ok(key)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ALICE, BOB};

    #[test]
    fn test_keypair_generation() {
        assert_eq!(ALICE.bits(), 2048);
        assert_eq!(ALICE.public().inner().e(), &BigUint::from(RSA_PUBLIC_EXPONENT));
        assert_ne!(ALICE.public(), BOB.public());
    }

    #[test]
    fn test_undersized_rsa_rejected() {
        assert!(matches!(generate_rsa_keypair(1024), Err(Error::KeyGen(_))));
        assert!(matches!(generate_rsa_keypair(16384), Err(Error::KeyGen(_))));
        assert!(matches!(generate_rsa_keypair(2049), Err(Error::KeyGen(_))));
    }

    #[test]
    fn test_symmetric_key_generation() {
        let k1 = generate_symmetric_key(256).unwrap();
        let k2 = generate_symmetric_key(256).unwrap();

        assert_ne!(k1, k2);
        assert!(matches!(generate_symmetric_key(128), Err(Error::KeyGen(_))));
    }

    #[test]
    fn test_symmetric_key_from_slice_length() {
        assert!(SymmetricKey::from_slice(&[7u8; 32]).is_ok());
        assert!(matches!(
            SymmetricKey::from_slice(&[7u8; 16]),
            Err(Error::Cipher(_))
        ));
    }

    #[test]
    fn test_public_key_pem_round_trip() {
        let pem = ALICE.public().to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let restored = PublicKey::from_pem(&pem).unwrap();
        assert_eq!(&restored, ALICE.public());
        assert_eq!(restored.fingerprint(), ALICE.public().fingerprint());
    }

    #[test]
    fn test_public_key_der_and_autodetect() {
        let der = ALICE.public().to_der().unwrap();
        let pem = ALICE.public().to_pem().unwrap();

        assert_eq!(&PublicKey::parse(&der).unwrap(), ALICE.public());
        assert_eq!(&PublicKey::parse(pem.as_bytes()).unwrap(), ALICE.public());
    }

    #[test]
    fn test_private_key_round_trip() {
        let pem = ALICE.private().to_pem().unwrap();
        let restored = KeyPair::from_private(PrivateKey::from_pem(&pem).unwrap());
        assert_eq!(restored.public(), ALICE.public());

        let der = ALICE.private().to_der().unwrap();
        let restored = PrivateKey::parse(&der).unwrap();
        assert_eq!(restored.bits(), 2048);
    }

    #[test]
    fn test_malformed_keys_rejected() {
        assert!(matches!(
            PublicKey::from_pem("-----BEGIN PUBLIC KEY-----\nnot base64\n-----END PUBLIC KEY-----"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            PublicKey::parse(b"\x30\x03\x02\x01"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            PrivateKey::parse(b"garbage"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_small_public_key_rejected() {
        let small = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let der = RsaPublicKey::from(&small).to_public_key_der().unwrap();

        assert!(matches!(
            PublicKey::from_der(der.as_bytes()),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_short_modulus_rejected() {
        // 2047 bits still occupies 256 bytes
        let short = RsaPrivateKey::new(&mut OsRng, 2047).unwrap();
        assert_eq!(short.size(), 256);

        let public_der = RsaPublicKey::from(&short).to_public_key_der().unwrap();
        assert!(matches!(
            PublicKey::from_der(public_der.as_bytes()),
            Err(Error::InvalidKey(_))
        ));

        let private_pem = short.to_pkcs8_pem(LineEnding::LF).unwrap();
        assert!(matches!(
            PrivateKey::from_pem(&private_pem),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let key = SymmetricKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{:?}", key), "SymmetricKey(..)");

        let rendered = format!("{:?}", ALICE.private());
        assert!(rendered.contains("2048"));
        assert!(!rendered.contains("BEGIN"));
    }
}

//! # Package Format
//!
//! The single artifact exchanged between sender and receiver.
//!
//! ## Wire Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SEALBOX PACKAGE (v1)                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  magic            4 bytes   "SBX\0"                                    │
//! │  version          1 byte    0x01                                       │
//! │  digest alg       1 byte    0x01 = SHA-256                             │
//! │  cipher alg       1 byte    0x01 = AES-256-GCM                         │
//! │                                                                         │
//! │  Length-prefixed fields, u32 big-endian length then bytes:             │
//! │  ┌──────────────┬──────────────────────────────────────────────────┐   │
//! │  │ iv           │ 12 bytes                                          │   │
//! │  │ ciphertext   │ plaintext length + 16-byte tag                    │   │
//! │  │ wrapped key  │ recipient modulus size                            │   │
//! │  │ signature    │ sender modulus size                               │   │
//! │  │ digest       │ 32 bytes                                          │   │
//! │  │ file name    │ 0-255 bytes UTF-8, empty when absent              │   │
//! │  └──────────────┴──────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Nothing may follow the last field.                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use base64::Engine as _;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::crypto::{
    CipherAlgorithm, Digest, DigestAlgorithm, Nonce, Signature, WrappedKey, DIGEST_SIZE,
    MAX_SIGNATURE_SIZE, MAX_WRAPPED_KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
use crate::error::{Error, Result};

/// Leading bytes of every serialized package
pub const PACKAGE_MAGIC: [u8; 4] = *b"SBX\0";

/// Current serialization format version
pub const PACKAGE_VERSION: u8 = 1;

/// Largest ciphertext a package can carry (u32 length prefix)
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Longest file name carried in metadata, in bytes
pub const MAX_FILE_NAME_LEN: usize = 255;

const ARMOR_BEGIN: &str = "-----BEGIN SEALBOX PACKAGE-----";
const ARMOR_END: &str = "-----END SEALBOX PACKAGE-----";
const ARMOR_LINE_WIDTH: usize = 64;
const HEADER_LEN: usize = PACKAGE_MAGIC.len() + 3;

/// Descriptive fields that travel with the encrypted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Hash used for the signed digest
    pub digest_algorithm: DigestAlgorithm,
    /// Cipher used for the payload
    pub cipher_algorithm: CipherAlgorithm,
    /// Digest of the plaintext that the signature covers
    pub digest: Digest,
    /// Original file name, if the sender chose to include it
    pub file_name: Option<String>,
}

impl PackageMetadata {
    /// Metadata for the engine's only suite (SHA-256 + AES-256-GCM)
    pub fn new(digest: Digest, file_name: Option<String>) -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            cipher_algorithm: CipherAlgorithm::Aes256Gcm,
            digest,
            file_name,
        }
    }
}

/// An assembled package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    ciphertext: Vec<u8>,
    iv: Nonce,
    wrapped_key: WrappedKey,
    signature: Signature,
    metadata: PackageMetadata,
}

impl Package {
    /// Encrypted payload including the authentication tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Nonce the payload was encrypted under
    pub fn iv(&self) -> &Nonce {
        &self.iv
    }

    /// Session key encrypted for the recipient
    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }

    /// Sender's signature over the digest
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Algorithms, digest and file name
    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Serialize to the binary wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let file_name = self.metadata.file_name.as_deref().unwrap_or("").as_bytes();
        let body_len = [
            NONCE_SIZE,
            self.ciphertext.len(),
            self.wrapped_key.len(),
            self.signature.len(),
            DIGEST_SIZE,
            file_name.len(),
        ]
        .iter()
        .map(|len| len + 4)
        .sum::<usize>();

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body_len);
        buf.put_slice(&PACKAGE_MAGIC);
        buf.put_u8(PACKAGE_VERSION);
        buf.put_u8(self.metadata.digest_algorithm.id());
        buf.put_u8(self.metadata.cipher_algorithm.id());

        put_field(&mut buf, self.iv.as_bytes());
        put_field(&mut buf, &self.ciphertext);
        put_field(&mut buf, self.wrapped_key.as_bytes());
        put_field(&mut buf, self.signature.as_bytes());
        put_field(&mut buf, self.metadata.digest.as_bytes());
        put_field(&mut buf, file_name);

        buf.to_vec()
    }

    /// Serialize as base64 text between armor lines
    pub fn to_armored(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.to_bytes());

        let mut out = String::with_capacity(encoded.len() + encoded.len() / ARMOR_LINE_WIDTH + 64);
        out.push_str(ARMOR_BEGIN);
        out.push('\n');
        for line in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
            // base64 output is ASCII, so every chunk boundary is a char boundary
            out.push_str(&String::from_utf8_lossy(line));
            out.push('\n');
        }
        out.push_str(ARMOR_END);
        out.push('\n');
        out
    }

    /// Parse armored text produced by [`Package::to_armored`]
    pub fn from_armored(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());

        if lines.next() != Some(ARMOR_BEGIN) {
            return Err(Error::Format("missing armor header".into()));
        }

        let mut body = String::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line == ARMOR_END {
                closed = true;
                break;
            }
            body.push_str(line);
        }
        if !closed {
            return Err(Error::Format("missing armor footer".into()));
        }
        if lines.any(|l| !l.is_empty()) {
            return Err(Error::Format("unexpected text after armor footer".into()));
        }

        let bytes = base64::engine::general_purpose::STANDARD.decode(body)?;
        disassemble(&bytes)
    }

    /// Whether the input looks like armored text rather than binary
    pub fn is_armored(bytes: &[u8]) -> bool {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        bytes[start..].starts_with(ARMOR_BEGIN.as_bytes())
    }
}

/// Assemble a package from its parts
///
/// Only checks structural completeness: every field present and non-empty,
/// and within the wire format's bounds.
pub fn assemble(
    ciphertext: Vec<u8>,
    iv: Nonce,
    wrapped_key: WrappedKey,
    signature: Signature,
    metadata: PackageMetadata,
) -> Result<Package> {
    check_parts(&ciphertext, &wrapped_key, &signature, &metadata)?;

    Ok(Package {
        ciphertext,
        iv,
        wrapped_key,
        signature,
        metadata,
    })
}

/// The checks [`assemble`] applies, without taking ownership of the parts
pub(crate) fn check_parts(
    ciphertext: &[u8],
    wrapped_key: &WrappedKey,
    signature: &Signature,
    metadata: &PackageMetadata,
) -> Result<()> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Format(format!(
            "ciphertext must be at least {} bytes, got {}",
            TAG_SIZE,
            ciphertext.len()
        )));
    }
    if ciphertext.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::Format("ciphertext exceeds the maximum payload size".into()));
    }
    check_len("wrapped key", wrapped_key.len(), MAX_WRAPPED_KEY_SIZE)?;
    check_len("signature", signature.len(), MAX_SIGNATURE_SIZE)?;

    if let Some(name) = &metadata.file_name {
        if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
            return Err(Error::Format(format!(
                "file name must be 1-{} bytes, got {}",
                MAX_FILE_NAME_LEN,
                name.len()
            )));
        }
    }
    Ok(())
}

/// Parse a serialized package
pub fn disassemble(bytes: &[u8]) -> Result<Package> {
    let mut buf = bytes;

    if buf.remaining() < HEADER_LEN {
        return Err(Error::Format("truncated header".into()));
    }
    if buf[..PACKAGE_MAGIC.len()] != PACKAGE_MAGIC {
        return Err(Error::Format("not a sealbox package".into()));
    }
    buf.advance(PACKAGE_MAGIC.len());

    let version = buf.get_u8();
    if version != PACKAGE_VERSION {
        return Err(Error::Format(format!("unsupported version {}", version)));
    }
    let digest_algorithm = DigestAlgorithm::from_id(buf.get_u8())
        .ok_or_else(|| Error::Format("unknown digest algorithm".into()))?;
    let cipher_algorithm = CipherAlgorithm::from_id(buf.get_u8())
        .ok_or_else(|| Error::Format("unknown cipher algorithm".into()))?;

    let iv = take_field(&mut buf, "iv", NONCE_SIZE)?;
    let iv = Nonce::from_slice(iv)
        .map_err(|_| Error::Format(format!("iv must be {} bytes", NONCE_SIZE)))?;
    let ciphertext = take_field(&mut buf, "ciphertext", MAX_PAYLOAD_SIZE)?.to_vec();
    let wrapped_key = take_field(&mut buf, "wrapped key", MAX_WRAPPED_KEY_SIZE)?.to_vec();
    let signature = take_field(&mut buf, "signature", MAX_SIGNATURE_SIZE)?.to_vec();
    let digest = Digest::from_slice(take_field(&mut buf, "digest", DIGEST_SIZE)?)?;
    let file_name = take_field(&mut buf, "file name", MAX_FILE_NAME_LEN)?;
    let file_name = match file_name {
        [] => None,
        name => Some(
            std::str::from_utf8(name)
                .map_err(|_| Error::Format("file name is not UTF-8".into()))?
                .to_string(),
        ),
    };

    if buf.has_remaining() {
        return Err(Error::Format(format!(
            "{} trailing bytes after package",
            buf.remaining()
        )));
    }

    assemble(
        ciphertext,
        iv,
        WrappedKey::from_bytes(wrapped_key),
        Signature::from_bytes(signature),
        PackageMetadata {
            digest_algorithm,
            cipher_algorithm,
            digest,
            file_name,
        },
    )
}

fn check_len(field: &str, len: usize, max: usize) -> Result<()> {
    if len == 0 || len > max {
        return Err(Error::Format(format!(
            "{} must be 1-{} bytes, got {}",
            field, max, len
        )));
    }
    Ok(())
}

fn put_field(buf: &mut BytesMut, field: &[u8]) {
    buf.put_u32(field.len() as u32);
    buf.put_slice(field);
}

fn take_field<'a>(buf: &mut &'a [u8], field: &str, max: usize) -> Result<&'a [u8]> {
    if buf.remaining() < 4 {
        return Err(Error::Format(format!("truncated {} length", field)));
    }
    let len = buf.get_u32() as usize;
    if len > max {
        return Err(Error::Format(format!(
            "{} length {} exceeds {}",
            field, len, max
        )));
    }
    if buf.remaining() < len {
        return Err(Error::Format(format!("truncated {}", field)));
    }

    let (value, rest) = buf.split_at(len);
    *buf = rest;
    Ok(value)
}

// ============================================================================
// TESTS
// ============================================================================

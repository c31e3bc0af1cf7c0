//! # Cryptography Module
//!
//! All cryptographic primitives used by Sealbox Core.
//!
//! ## Hybrid Scheme
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   file bytes ──► SHA-256 ──► Digest ──► RSA sign (sender private)      │
//! │       │                                        │                        │
//! │       ▼                                        ▼                        │
//! │   AES-256-GCM(session key, random nonce)    Signature                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   Ciphertext          session key ──► RSA-OAEP (recipient public)      │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                          WrappedKey                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | RSA-2048, e=65537 | Identities | Required key type, PEM/DER interop |
//! | RSASSA-PKCS1-v1_5 / SHA-256 | Signing | Deterministic output |
//! | RSA-OAEP / SHA-256 | Key wrapping | No padding oracle |
//! | AES-256-GCM | File encryption | AEAD, hardware acceleration |
//! | SHA-256 | Digest | 32-byte fingerprint, universal support |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: private keys and session keys are zeroized on drop
//! 2. **Secure Random**: `rand::rngs::OsRng` for every key and nonce
//! 3. **No Nonce Reuse**: a new session key and a new nonce for every package
//! 4. **Uniform Failures**: unwrap, tag and signature failures look the same

mod digest;
mod encryption;
mod keys;
mod signing;
mod wrap;

pub use digest::{hash, hash_reader, Digest, DigestAlgorithm, DIGEST_SIZE};
pub use encryption::{decrypt, encrypt, CipherAlgorithm, Nonce, NONCE_SIZE, TAG_SIZE};
pub use keys::{
    generate_rsa_keypair, generate_symmetric_key, KeyPair, PrivateKey, PublicKey, SymmetricKey,
    DEFAULT_RSA_BITS, MAX_RSA_BITS, MIN_RSA_BITS, RSA_PUBLIC_EXPONENT, SYMMETRIC_KEY_SIZE,
};
pub use signing::{sign, verify, Signature, MAX_SIGNATURE_SIZE};
pub use wrap::{max_wrap_payload, unwrap, wrap, WrappedKey, MAX_WRAPPED_KEY_SIZE};

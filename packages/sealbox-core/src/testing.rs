//! Shared fixtures for unit tests.

use once_cell::sync::Lazy;

use crate::crypto::{generate_rsa_keypair, KeyPair, PrivateKey};

/// Sender identity shared by the suite so RSA generation is paid once
pub(crate) static ALICE: Lazy<KeyPair> = Lazy::new(|| generate_rsa_keypair(2048).unwrap());

/// Recipient identity shared by the suite
pub(crate) static BOB: Lazy<KeyPair> = Lazy::new(|| generate_rsa_keypair(2048).unwrap());

/// Independent copy of a shared pair, for APIs that take ownership
pub(crate) fn owned(pair: &KeyPair) -> KeyPair {
    let pem = pair.private().to_pem().unwrap();
    KeyPair::from_private(PrivateKey::from_pem(&pem).unwrap())
}

//! # Sealbox Core
//!
//! A hybrid cryptographic packaging and verification engine. A file is
//! signed by its sender, encrypted under a one-time AES key, and that key
//! is wrapped for a single recipient's RSA public key. The recipient
//! reverses the process and accepts the file only if every check passes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SEALBOX CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                          Pipeline                               │   │
//! │  │  SenderPipeline   Idle → … → Packaged                           │   │
//! │  │  ReceiverPipeline Idle → … → Verified | Rejected                │   │
//! │  └──────────┬─────────────────────────────────────────┬────────────┘   │
//! │             │                                         │                 │
//! │  ┌──────────▼──────────┐  ┌─────────────┐  ┌──────────▼──────────┐     │
//! │  │       Crypto        │  │   Package   │  │        Batch        │     │
//! │  │                     │  │             │  │                     │     │
//! │  │ - RSA key pairs     │  │ - Assemble  │  │ - tokio JoinSet     │     │
//! │  │ - SHA-256 digest    │  │ - Wire fmt  │  │ - Bounded fan-out   │     │
//! │  │ - PKCS#1 v1.5 sign  │  │ - Armor     │  │ - Input order kept  │     │
//! │  │ - AES-256-GCM       │  │             │  │                     │     │
//! │  │ - RSA-OAEP wrap     │  │             │  │                     │     │
//! │  └─────────────────────┘  └─────────────┘  └─────────────────────┘     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Cryptographic primitives (keys, digest, signing, encryption, wrapping)
//! - [`package`] - The transmissible bundle and its wire format
//! - [`pipeline`] - Sender and receiver state machines
//! - [`config`] - Engine parameters
//! - [`batch`] - Parallel processing of independent packages
//!
//! ## Boundaries
//!
//! The engine performs no network or filesystem I/O. Callers read files and
//! key strings, hand bytes in, and decide what to do with the results.
//!
//! ## Example
//!
//! ```ignore
//! use sealbox_core::{open, seal, EngineConfig};
//!
//! let sealed = seal(b"42", &recipient_public, &EngineConfig::default())?;
//! let bytes = sealed.package.to_bytes();
//!
//! let opened = open(&bytes, &recipient_private, &sealed.sender_public)?;
//! assert_eq!(opened.plaintext, b"42");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod batch;
pub mod config;
pub mod crypto;
pub mod error;
pub mod package;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::EngineConfig;
pub use crypto::{Digest, KeyPair, PrivateKey, PublicKey};
pub use error::{Error, RejectReason, Result};
pub use package::Package;
pub use pipeline::{
    open, seal, Opened, ReceiverPipeline, RunControl, SealOutput, SenderPipeline, Stage,
    StageReport, Verdict,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Sealbox Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        package_format: package::PACKAGE_VERSION,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Package wire format version written by this build
    pub package_format: u8,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert_eq!(info.package_format, 1);
    }
}

//! # Error Handling
//!
//! Error types for Sealbox Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Key Material Errors (100-199)                                     │
//! │  │   ├── KeyGen               - Key generation refused or failed       │
//! │  │   ├── Entropy              - OS random source unavailable           │
//! │  │   └── InvalidKey           - Unparsable or undersized key           │
//! │  │                                                                      │
//! │  ├── Crypto Errors (200-299)                                           │
//! │  │   ├── Sign                 - Signature could not be produced        │
//! │  │   ├── Cipher               - Malformed cipher input                 │
//! │  │   ├── Integrity            - Authentication tag mismatch            │
//! │  │   ├── Wrap                 - Session key could not be wrapped       │
//! │  │   └── Unwrap               - Session key could not be recovered     │
//! │  │                                                                      │
//! │  ├── Format Errors (300-399)                                           │
//! │  │   └── Format               - Truncated or malformed package         │
//! │  │                                                                      │
//! │  ├── Pipeline Errors (400-499)                                         │
//! │  │   ├── Sequence             - Stage invoked out of order             │
//! │  │   ├── OperationTimedOut    - Deadline passed between stages         │
//! │  │   ├── Cancelled            - Caller cancelled between stages        │
//! │  │   ├── Rejected             - Receiver refused the package           │
//! │  │   └── InvalidConfig        - Engine configuration out of range      │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                                         │
//! │      ├── Io                   - Reader failed while streaming          │
//! │      └── Internal             - Should not happen                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Integrity`, `Unwrap` and a failed signature check all render and
//! serialize as the same "verification failed" text. The specific cause is
//! only available through [`RejectReason::diagnostic_code`], which is meant
//! for logs.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias for Sealbox Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a receiver pipeline ended in the `Rejected` state.
///
/// All variants display and serialize identically. Use
/// [`RejectReason::diagnostic_code`] when the cause has to be told apart,
/// e.g. in a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The wrapped session key could not be recovered
    Unwrap,
    /// The ciphertext failed authentication
    Integrity,
    /// The ciphertext or IV was structurally malformed
    Cipher,
    /// The recomputed digest differs from the signed digest
    DigestMismatch,
    /// The signature did not verify against the sender's public key
    BadSignature,
}

impl RejectReason {
    /// Internal diagnostic code. Never show this to an untrusted party.
    pub fn diagnostic_code(&self) -> u16 {
        match self {
            RejectReason::Unwrap => 1,
            RejectReason::Integrity => 2,
            RejectReason::Cipher => 3,
            RejectReason::DigestMismatch => 4,
            RejectReason::BadSignature => 5,
        }
    }
}

const REJECTED_MESSAGE: &str = "verification failed";

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REJECTED_MESSAGE)
    }
}

impl Serialize for RejectReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REJECTED_MESSAGE)
    }
}

/// Main error type for Sealbox Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Key Material Errors (100-199)
    // ========================================================================

    /// Key generation was refused or failed
    #[error("Key generation failed: {0}")]
    KeyGen(String),

    /// The OS random source could not be read
    #[error("Random number generation failed")]
    Entropy,

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// Signing failed
    #[error("Signing failed: {0}")]
    Sign(String),

    /// Malformed input to the symmetric cipher
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Authentication tag did not verify
    #[error("Verification failed")]
    Integrity,

    /// Session key could not be wrapped for the recipient
    #[error("Key wrap failed: {0}")]
    Wrap(String),

    /// Session key could not be unwrapped
    #[error("Verification failed")]
    Unwrap,

    // ========================================================================
    // Format Errors (300-399)
    // ========================================================================

    /// Truncated or malformed package
    #[error("Malformed package: {0}")]
    Format(String),

    // ========================================================================
    // Pipeline Errors (400-499)
    // ========================================================================

    /// A pipeline stage was invoked from the wrong state
    #[error("Stage {attempted} cannot run from state {current}")]
    Sequence {
        /// Stage the caller tried to enter
        attempted: Stage,
        /// Stage the pipeline is currently in
        current: Stage,
    },

    /// The caller's deadline passed before the next stage started
    #[error("Operation timed out before stage {0}")]
    OperationTimedOut(Stage),

    /// The caller cancelled before the next stage started
    #[error("Operation cancelled before stage {0}")]
    Cancelled(Stage),

    /// The receiver refused the package
    #[error("Package rejected: {reason}")]
    Rejected {
        /// Internal cause, displays generically
        reason: RejectReason,
    },

    /// Engine configuration out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Reading the input stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric error code, grouped by category:
    /// - 100-199: Key material
    /// - 200-299: Crypto
    /// - 300-399: Format
    /// - 400-499: Pipeline
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::KeyGen(_) => 100,
            Error::Entropy => 101,
            Error::InvalidKey(_) => 102,

            Error::Sign(_) => 200,
            Error::Cipher(_) => 201,
            // Integrity and Unwrap share a code so they cannot be told
            // apart from the outside.
            Error::Integrity | Error::Unwrap => 202,
            Error::Wrap(_) => 203,

            Error::Format(_) => 300,

            Error::Sequence { .. } => 400,
            Error::OperationTimedOut(_) => 401,
            Error::Cancelled(_) => 402,
            Error::Rejected { .. } => 403,
            Error::InvalidConfig(_) => 404,

            Error::Io(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the pipeline in a state from which the same
    /// stage can be attempted again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::OperationTimedOut(_) | Error::Cancelled(_) | Error::Entropy
        )
    }

    /// The rejection reason, if this error is a receiver rejection
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Format(format!("invalid base64: {}", err))
    }
}

// ============================================================================
// REPORTABLE ERROR REPRESENTATION
// ============================================================================

/// Serializable error representation for callers that render results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReport {
    /// Numeric error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the error is recoverable
    pub recoverable: bool,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

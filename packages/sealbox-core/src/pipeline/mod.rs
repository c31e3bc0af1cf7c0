//! # Pipeline Module
//!
//! Explicit state machines that drive the crypto primitives in order.
//!
//! ## State Machines
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SENDER PIPELINE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Idle ──generate_keys──► KeysReady ──compute_digest──► DigestComputed  │
//! │                                                              │          │
//! │          ┌───────────────────────── sign ◄───────────────────┘          │
//! │          ▼                                                              │
//! │       Signed ──encrypt──► Encrypted ──wrap_key──► KeyWrapped           │
//! │                                                       │                 │
//! │                                      Packaged ◄──package                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RECEIVER PIPELINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Idle ──unwrap_key──► KeyUnwrapped ──decrypt──► Decrypted ──verify──►  │
//! │   │                        │                        │       Verified    │
//! │   │                        │                        │                   │
//! │   └────────────────────────┴────────────────────────┴──► Rejected      │
//! │                      (any cryptographic failure, terminal)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every state carries exactly the data that exists at that point. Calling
//! a stage from the wrong state returns [`Error::Sequence`] and changes
//! nothing. A failed sender stage also leaves the state where it was, so
//! the caller may retry it.
//!
//! ## Run Control
//!
//! The `run` drivers consult a [`RunControl`] between stages. Primitives
//! are never interrupted: a deadline or cancellation takes effect before
//! the next stage starts, and the pipeline stays resumable.

mod receiver;
mod sender;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::crypto::{Digest, KeyPair, PrivateKey, PublicKey};
use crate::error::{Error, Result};
use crate::package::{disassemble, Package};

pub use receiver::{ReceiverPipeline, Verdict};
pub use sender::SenderPipeline;

// ============================================================================
// STAGES
// ============================================================================

/// A pipeline state, shared by sender and receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing done yet
    Idle,
    /// Sender key pair and session key exist
    KeysReady,
    /// Plaintext digest computed
    DigestComputed,
    /// Digest signed with the sender's private key
    Signed,
    /// Plaintext encrypted under the session key
    Encrypted,
    /// Session key wrapped for the recipient
    KeyWrapped,
    /// Package assembled
    Packaged,
    /// Session key recovered by the recipient
    KeyUnwrapped,
    /// Ciphertext authenticated and decrypted
    Decrypted,
    /// Digest and signature confirmed
    Verified,
    /// Receiver refused the package
    Rejected,
}

impl Stage {
    /// Short description of the work that leads into this stage
    pub fn action(&self) -> &'static str {
        match self {
            Stage::Idle => "start",
            Stage::KeysReady => "generate key material",
            Stage::DigestComputed => "hash plaintext",
            Stage::Signed => "sign digest",
            Stage::Encrypted => "encrypt file",
            Stage::KeyWrapped => "wrap session key",
            Stage::Packaged => "assemble package",
            Stage::KeyUnwrapped => "unwrap session key",
            Stage::Decrypted => "decrypt file",
            Stage::Verified => "verify digest and signature",
            Stage::Rejected => "reject package",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::KeysReady => "KeysReady",
            Stage::DigestComputed => "DigestComputed",
            Stage::Signed => "Signed",
            Stage::Encrypted => "Encrypted",
            Stage::KeyWrapped => "KeyWrapped",
            Stage::Packaged => "Packaged",
            Stage::KeyUnwrapped => "KeyUnwrapped",
            Stage::Decrypted => "Decrypted",
            Stage::Verified => "Verified",
            Stage::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// Outcome of one stage attempt, for callers that show per-step results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage that was attempted
    pub stage: Stage,
    /// Whether the stage was reached
    pub passed: bool,
    /// Error text when it was not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageReport {
    pub(crate) fn passed(stage: Stage) -> Self {
        Self {
            stage,
            passed: true,
            reason: None,
        }
    }

    pub(crate) fn failed(stage: Stage, err: &Error) -> Self {
        Self {
            stage,
            passed: false,
            reason: Some(err.to_string()),
        }
    }
}

// ============================================================================
// RUN CONTROL
// ============================================================================

/// Deadline and cancellation flag checked between stages
///
/// Clones share the cancellation flag, so a clone handed to another thread
/// can stop a running pipeline before its next stage.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    /// No deadline, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop before any stage that would start after `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::default(),
        }
    }

    /// Use `other`'s cancellation flag, keeping this control's deadline
    pub fn sharing_cancel(mut self, other: &RunControl) -> Self {
        self.cancelled = Arc::clone(&other.cancelled);
        self
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Request that every pipeline using this control stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`RunControl::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Check whether `next` may start
    pub fn check(&self, next: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(next));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::OperationTimedOut(next)),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// ONE-SHOT OPERATIONS
// ============================================================================

/// Optional inputs to [`seal_with`]
#[derive(Debug, Default)]
pub struct SealOptions {
    /// File name to record in the package metadata
    pub file_name: Option<String>,
    /// Existing sender identity; a fresh one is generated when absent
    pub sender: Option<KeyPair>,
}

/// Result of a completed sender run
#[derive(Debug)]
pub struct SealOutput {
    /// The assembled package
    pub package: Package,
    /// Public key the receiver needs to verify the signature
    pub sender_public: PublicKey,
    /// One entry per stage attempted
    pub reports: Vec<StageReport>,
}

/// Result of a verified receiver run
#[derive(Debug)]
pub struct Opened {
    /// Recovered file bytes
    pub plaintext: Vec<u8>,
    /// Digest the sender signed, which matched the plaintext
    pub digest: Digest,
    /// File name carried in the package, if any
    pub file_name: Option<String>,
    /// One entry per stage attempted
    pub reports: Vec<StageReport>,
}

/// Seal `plaintext` for `recipient` with a newly generated sender identity
pub fn seal(plaintext: &[u8], recipient: &PublicKey, config: &EngineConfig) -> Result<SealOutput> {
    seal_with(
        plaintext,
        SealOptions::default(),
        recipient,
        config,
        &config.run_control(),
    )
}

/// Seal `plaintext` with explicit options and run control
pub fn seal_with(
    plaintext: &[u8],
    options: SealOptions,
    recipient: &PublicKey,
    config: &EngineConfig,
    control: &RunControl,
) -> Result<SealOutput> {
    config.validate()?;

    let mut pipeline = SenderPipeline::new(plaintext, config.clone());
    if let Some(name) = options.file_name {
        pipeline = pipeline.with_file_name(name)?;
    }
    if let Some(sender) = options.sender {
        pipeline.load_keys(sender)?;
    }

    pipeline.run(recipient, control)?;
    pipeline.into_output()
}

/// Open a binary or armored package and verify it came from `sender_public`
pub fn open(
    package_bytes: &[u8],
    receiver: &PrivateKey,
    sender_public: &PublicKey,
) -> Result<Opened> {
    open_with(package_bytes, receiver, sender_public, &RunControl::new())
}

/// Open a package under the given run control
pub fn open_with(
    package_bytes: &[u8],
    receiver: &PrivateKey,
    sender_public: &PublicKey,
    control: &RunControl,
) -> Result<Opened> {
    let package = if Package::is_armored(package_bytes) {
        let text = std::str::from_utf8(package_bytes)
            .map_err(|_| Error::Format("armored package is not UTF-8".into()))?;
        Package::from_armored(text)?
    } else {
        disassemble(package_bytes)?
    };

    let mut pipeline = ReceiverPipeline::new(package, receiver, sender_public);
    pipeline.run(control)?;
    pipeline.into_opened()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::testing::{owned, ALICE, BOB};
    use std::time::Duration;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::DigestComputed.to_string(), "DigestComputed");
        assert_eq!(Stage::Rejected.to_string(), "Rejected");
        assert_eq!(Stage::Signed.action(), "sign digest");
    }

    #[test]
    fn test_run_control_cancel_is_shared() {
        let control = RunControl::new();
        let handle = control.clone();

        assert!(control.check(Stage::KeysReady).is_ok());
        handle.cancel();

        assert!(control.is_cancelled());
        assert!(matches!(
            control.check(Stage::KeysReady),
            Err(Error::Cancelled(Stage::KeysReady))
        ));
    }

    #[test]
    fn test_run_control_expired_deadline() {
        let control = RunControl::with_deadline(Instant::now() - Duration::from_millis(1));

        assert!(matches!(
            control.check(Stage::Signed),
            Err(Error::OperationTimedOut(Stage::Signed))
        ));
    }

    #[test]
    fn test_stage_report_serialization() {
        let ok = serde_json::to_value(StageReport::passed(Stage::Signed)).unwrap();
        assert_eq!(ok, serde_json::json!({"stage": "Signed", "passed": true}));

        let failed = StageReport::failed(
            Stage::Verified,
            &Error::Rejected {
                reason: RejectReason::BadSignature,
            },
        );
        assert_eq!(
            failed.reason.as_deref(),
            Some("Package rejected: verification failed")
        );
    }

    #[test]
    fn test_seal_and_open() {
        let sealed = seal_with(
            b"42",
            SealOptions {
                file_name: Some("exam-answers.txt".into()),
                sender: Some(owned(&ALICE)),
            },
            BOB.public(),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap();

        assert_eq!(&sealed.sender_public, ALICE.public());
        assert_eq!(sealed.reports.len(), 6);
        assert!(sealed.reports.iter().all(|r| r.passed));

        let opened = open(&sealed.package.to_bytes(), BOB.private(), ALICE.public()).unwrap();
        assert_eq!(opened.plaintext, b"42");
        assert_eq!(opened.file_name.as_deref(), Some("exam-answers.txt"));
        assert_eq!(opened.reports.len(), 3);
    }

    #[test]
    fn test_open_accepts_armor() {
        let sealed = seal_with(
            b"armored",
            SealOptions {
                file_name: None,
                sender: Some(owned(&ALICE)),
            },
            BOB.public(),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap();

        let armored = sealed.package.to_armored();
        let opened = open(armored.as_bytes(), BOB.private(), ALICE.public()).unwrap();
        assert_eq!(opened.plaintext, b"armored");
    }

    #[test]
    fn test_open_wrong_sender_is_rejected() {
        let sealed = seal_with(
            b"42",
            SealOptions {
                file_name: None,
                sender: Some(owned(&ALICE)),
            },
            BOB.public(),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap();

        let err = open(&sealed.package.to_bytes(), BOB.private(), BOB.public()).unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::BadSignature));
    }

    #[test]
    fn test_seal_rejects_invalid_config() {
        let config = EngineConfig {
            max_parallel: 0,
            ..Default::default()
        };

        assert!(matches!(
            seal(b"42", BOB.public(), &config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_open_garbage_is_format_error() {
        assert!(matches!(
            open(b"not a package", BOB.private(), ALICE.public()),
            Err(Error::Format(_))
        ));
    }
}

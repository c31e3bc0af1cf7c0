//! Receiver side: package in, verified plaintext or rejection out.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       VERIFICATION GATE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  (a) unwrap(wrapped key, receiver private key)    else Rejected(Unwrap) │
//! │  (b) decrypt(ciphertext, iv, session key)      else Rejected(Integrity) │
//! │  (c) hash(plaintext) == signed digest     else Rejected(DigestMismatch) │
//! │  (d) verify(digest, signature, sender key)  else Rejected(BadSignature) │
//! │                                                                         │
//! │  Verified only when all four hold. Plaintext is released only from     │
//! │  Verified and is zeroized when a package is rejected.                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::mem;

use serde::Serialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, Digest, PrivateKey, PublicKey, Signature, SymmetricKey};
use crate::error::{Error, RejectReason, Result};
use crate::package::Package;
use crate::pipeline::{Opened, RunControl, Stage, StageReport};

/// Final outcome of a receiver pipeline
///
/// Serializes a rejection without its cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Not finished yet
    Pending,
    /// All checks passed
    Verified,
    /// A check failed; the reason is for diagnostics only
    Rejected(RejectReason),
}

enum ReceiverState {
    Idle {
        package: Package,
    },
    KeyUnwrapped {
        package: Package,
        session_key: SymmetricKey,
    },
    Decrypted {
        package: Package,
        plaintext: Zeroizing<Vec<u8>>,
    },
    Verified {
        plaintext: Vec<u8>,
        digest: Digest,
        file_name: Option<String>,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl ReceiverState {
    fn stage(&self) -> Stage {
        match self {
            ReceiverState::Idle { .. } => Stage::Idle,
            ReceiverState::KeyUnwrapped { .. } => Stage::KeyUnwrapped,
            ReceiverState::Decrypted { .. } => Stage::Decrypted,
            ReceiverState::Verified { .. } => Stage::Verified,
            ReceiverState::Rejected { .. } => Stage::Rejected,
        }
    }
}

/// Drives one package through key unwrapping, decryption and verification
///
/// Any cryptographic failure ends the pipeline in [`Stage::Rejected`] and
/// returns [`Error::Rejected`]. A rejected pipeline accepts no further
/// stages.
pub struct ReceiverPipeline<'a> {
    receiver: &'a PrivateKey,
    sender_public: &'a PublicKey,
    state: ReceiverState,
    reports: Vec<StageReport>,
}

impl<'a> ReceiverPipeline<'a> {
    /// Start an idle pipeline for `package`
    ///
    /// `receiver` unwraps the session key; `sender_public` is the key the
    /// signature must verify against.
    pub fn new(package: Package, receiver: &'a PrivateKey, sender_public: &'a PublicKey) -> Self {
        Self {
            receiver,
            sender_public,
            state: ReceiverState::Idle { package },
            reports: Vec::new(),
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Every stage attempted so far, in order
    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    /// Outcome so far
    pub fn verdict(&self) -> Verdict {
        match &self.state {
            ReceiverState::Verified { .. } => Verdict::Verified,
            ReceiverState::Rejected { reason } => Verdict::Rejected(*reason),
            _ => Verdict::Pending,
        }
    }

    /// Recovered plaintext, available only once verified
    pub fn plaintext(&self) -> Option<&[u8]> {
        match &self.state {
            ReceiverState::Verified { plaintext, .. } => Some(plaintext.as_slice()),
            _ => None,
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// `Idle → KeyUnwrapped`: recover the session key
    pub fn unwrap_key(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, ReceiverState::Rejected {
            reason: RejectReason::Unwrap,
        }) {
            ReceiverState::Idle { package } => {
                match crypto::unwrap(package.wrapped_key(), self.receiver) {
                    Ok(session_key) => {
                        debug!("unwrapped session key");
                        self.advance(ReceiverState::KeyUnwrapped {
                            package,
                            session_key,
                        });
                        Ok(())
                    }
                    Err(_) => Err(self.reject(Stage::KeyUnwrapped, RejectReason::Unwrap)),
                }
            }
            other => Err(self.out_of_order(Stage::KeyUnwrapped, other)),
        }
    }

    /// `KeyUnwrapped → Decrypted`: authenticate and decrypt the payload
    pub fn decrypt(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, ReceiverState::Rejected {
            reason: RejectReason::Integrity,
        }) {
            ReceiverState::KeyUnwrapped {
                package,
                session_key,
            } => {
                let result = crypto::decrypt(package.ciphertext(), package.iv(), &session_key);
                drop(session_key);
                match result {
                    Ok(plaintext) => {
                        debug!(plaintext_len = plaintext.len(), "decrypted payload");
                        self.advance(ReceiverState::Decrypted {
                            package,
                            plaintext: Zeroizing::new(plaintext),
                        });
                        Ok(())
                    }
                    Err(Error::Integrity) => {
                        Err(self.reject(Stage::Decrypted, RejectReason::Integrity))
                    }
                    Err(_) => Err(self.reject(Stage::Decrypted, RejectReason::Cipher)),
                }
            }
            other => Err(self.out_of_order(Stage::Decrypted, other)),
        }
    }

    /// `Decrypted → Verified`: compare digests and check the signature
    pub fn verify(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, ReceiverState::Rejected {
            reason: RejectReason::BadSignature,
        }) {
            ReceiverState::Decrypted {
                package,
                mut plaintext,
            } => {
                let signed = package.metadata().digest;
                let digest_matches = crypto::hash(&plaintext) == signed;
                // the signature is checked even when the digests differ
                let signature_valid = self.check_signature(&signed, package.signature());

                if !digest_matches {
                    return Err(self.reject(Stage::Verified, RejectReason::DigestMismatch));
                }
                if !signature_valid {
                    return Err(self.reject(Stage::Verified, RejectReason::BadSignature));
                }

                info!(
                    plaintext_len = plaintext.len(),
                    sender = %self.sender_public.fingerprint(),
                    "package verified"
                );
                self.advance(ReceiverState::Verified {
                    plaintext: mem::take(&mut *plaintext),
                    digest: signed,
                    file_name: package.metadata().file_name.clone(),
                });
                Ok(())
            }
            other => Err(self.out_of_order(Stage::Verified, other)),
        }
    }

    // ========================================================================
    // DRIVER
    // ========================================================================

    /// Run every remaining stage
    ///
    /// `control` is checked before each stage. On timeout or cancellation
    /// the pipeline stays at the last completed stage.
    pub fn run(&mut self, control: &RunControl) -> Result<&[u8]> {
        loop {
            let next = match self.stage() {
                Stage::Idle => Stage::KeyUnwrapped,
                Stage::KeyUnwrapped => Stage::Decrypted,
                Stage::Decrypted => Stage::Verified,
                Stage::Rejected => {
                    return Err(Error::Sequence {
                        attempted: Stage::Verified,
                        current: Stage::Rejected,
                    })
                }
                _ => break,
            };
            control.check(next)?;

            match next {
                Stage::KeyUnwrapped => self.unwrap_key()?,
                Stage::Decrypted => self.decrypt()?,
                _ => self.verify()?,
            }
        }

        self.plaintext()
            .ok_or_else(|| Error::Internal("receiver pipeline stopped before verification".into()))
    }

    /// Consume a verified pipeline
    pub fn into_opened(self) -> Result<Opened> {
        match self.state {
            ReceiverState::Verified {
                plaintext,
                digest,
                file_name,
            } => Ok(Opened {
                plaintext,
                digest,
                file_name,
                reports: self.reports,
            }),
            ReceiverState::Rejected { reason } => Err(Error::Rejected { reason }),
            other => Err(Error::Sequence {
                attempted: Stage::Verified,
                current: other.stage(),
            }),
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn advance(&mut self, state: ReceiverState) {
        let stage = state.stage();
        self.state = state;
        self.reports.push(StageReport::passed(stage));
    }

    fn check_signature(&self, digest: &Digest, signature: &Signature) -> bool {
        #[cfg(test)]
        tests::SIGNATURE_CHECKS.with(|count| count.set(count.get() + 1));

        crypto::verify(digest, signature, self.sender_public)
    }

    fn reject(&mut self, stage: Stage, reason: RejectReason) -> Error {
        warn!(
            stage = %stage,
            diagnostic = reason.diagnostic_code(),
            "package rejected"
        );
        self.state = ReceiverState::Rejected { reason };
        let err = Error::Rejected { reason };
        self.reports.push(StageReport::failed(stage, &err));
        err
    }

    fn out_of_order(&mut self, attempted: Stage, current: ReceiverState) -> Error {
        let err = Error::Sequence {
            attempted,
            current: current.stage(),
        };
        self.state = current;
        err
    }
}

impl fmt::Debug for ReceiverPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverPipeline")
            .field("stage", &self.stage())
            .field("verdict", &self.verdict())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::config::EngineConfig;
    use crate::crypto::WrappedKey;
    use crate::package::{assemble, disassemble, PackageMetadata};
    use crate::pipeline::SenderPipeline;
    use crate::testing::{owned, ALICE, BOB};

    thread_local! {
        pub(super) static SIGNATURE_CHECKS: Cell<usize> = const { Cell::new(0) };
    }

    fn signature_checks() -> usize {
        SIGNATURE_CHECKS.with(Cell::get)
    }

    fn sealed(plaintext: &[u8]) -> Package {
        let mut sender = SenderPipeline::new(plaintext, EngineConfig::default())
            .with_file_name("exam-answers.txt")
            .unwrap();
        sender.load_keys(owned(&ALICE)).unwrap();
        sender.run(BOB.public(), &RunControl::new()).unwrap();
        sender.into_output().unwrap().package
    }

    /// Rebuild `package` with one field replaced
    fn with_parts(
        package: &Package,
        ciphertext: Option<Vec<u8>>,
        wrapped_key: Option<Vec<u8>>,
        signature: Option<Vec<u8>>,
    ) -> Package {
        assemble(
            ciphertext.unwrap_or_else(|| package.ciphertext().to_vec()),
            *package.iv(),
            WrappedKey::from_bytes(
                wrapped_key.unwrap_or_else(|| package.wrapped_key().as_bytes().to_vec()),
            ),
            Signature::from_bytes(
                signature.unwrap_or_else(|| package.signature().as_bytes().to_vec()),
            ),
            package.metadata().clone(),
        )
        .unwrap()
    }

    fn flip(bytes: &[u8], index: usize) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out[index] ^= 0x01;
        out
    }

    fn run(package: Package) -> (Result<Vec<u8>>, Verdict, Stage) {
        let mut receiver = ReceiverPipeline::new(package, BOB.private(), ALICE.public());
        let result = receiver.run(&RunControl::new()).map(|p| p.to_vec());
        (result, receiver.verdict(), receiver.stage())
    }

    #[test]
    fn test_stages_in_order() {
        let mut receiver = ReceiverPipeline::new(sealed(b"42"), BOB.private(), ALICE.public());
        assert_eq!(receiver.verdict(), Verdict::Pending);

        receiver.unwrap_key().unwrap();
        assert_eq!(receiver.stage(), Stage::KeyUnwrapped);
        assert!(receiver.plaintext().is_none());

        receiver.decrypt().unwrap();
        assert_eq!(receiver.stage(), Stage::Decrypted);
        assert!(receiver.plaintext().is_none());

        receiver.verify().unwrap();
        assert_eq!(receiver.verdict(), Verdict::Verified);
        assert_eq!(receiver.plaintext(), Some(&b"42"[..]));

        let opened = receiver.into_opened().unwrap();
        assert_eq!(opened.digest, crypto::hash(b"42"));
        assert_eq!(opened.file_name.as_deref(), Some("exam-answers.txt"));
    }

    #[test]
    fn test_verify_before_decrypt_is_sequence_error() {
        let mut receiver = ReceiverPipeline::new(sealed(b"42"), BOB.private(), ALICE.public());

        let err = receiver.verify().unwrap_err();

        assert!(matches!(
            err,
            Error::Sequence {
                attempted: Stage::Verified,
                current: Stage::Idle
            }
        ));
        assert_eq!(receiver.stage(), Stage::Idle);
        assert!(receiver.reports().is_empty());
    }

    #[test]
    fn test_corrupted_ciphertext_rejected_integrity() {
        let package = sealed(b"42");
        let tampered = with_parts(&package, Some(flip(package.ciphertext(), 0)), None, None);

        let (result, verdict, stage) = run(tampered);

        assert_eq!(
            result.unwrap_err().reject_reason(),
            Some(RejectReason::Integrity)
        );
        assert_eq!(verdict, Verdict::Rejected(RejectReason::Integrity));
        assert_eq!(stage, Stage::Rejected);
    }

    #[test]
    fn test_every_ciphertext_bit_flip_rejected() {
        let package = sealed(b"the quick brown fox");

        for index in 0..package.ciphertext().len() {
            let tampered = with_parts(&package, Some(flip(package.ciphertext(), index)), None, None);
            let (result, verdict, _) = run(tampered);
            assert!(result.is_err());
            assert_ne!(verdict, Verdict::Verified);
        }
    }

    #[test]
    fn test_tampered_wrapped_key_rejected() {
        let package = sealed(b"42");

        for index in [0, 100, 255] {
            let wrapped = flip(package.wrapped_key().as_bytes(), index);
            let (result, verdict, _) = run(with_parts(&package, None, Some(wrapped), None));

            assert!(result.is_err());
            assert!(matches!(verdict, Verdict::Rejected(_)));
        }
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let package = sealed(b"42");

        for index in [0, 128, 255] {
            let signature = flip(package.signature().as_bytes(), index);
            let (result, verdict, _) = run(with_parts(&package, None, None, Some(signature)));

            assert!(result.is_err());
            assert_eq!(verdict, Verdict::Rejected(RejectReason::BadSignature));
        }
    }

    #[test]
    fn test_substituted_digest_rejected() {
        let package = sealed(b"42");
        let mut metadata = package.metadata().clone();
        metadata.digest = crypto::hash(b"43");
        let forged = assemble(
            package.ciphertext().to_vec(),
            *package.iv(),
            package.wrapped_key().clone(),
            package.signature().clone(),
            metadata,
        )
        .unwrap();

        let (_, verdict, _) = run(forged);

        assert_eq!(verdict, Verdict::Rejected(RejectReason::DigestMismatch));
    }

    #[test]
    fn test_digest_mismatch_still_checks_signature() {
        let package = sealed(b"42");
        let mut metadata = package.metadata().clone();
        metadata.digest = crypto::hash(b"43");
        let forged = assemble(
            package.ciphertext().to_vec(),
            *package.iv(),
            package.wrapped_key().clone(),
            package.signature().clone(),
            metadata,
        )
        .unwrap();
        let mut receiver = ReceiverPipeline::new(forged, BOB.private(), ALICE.public());
        receiver.unwrap_key().unwrap();
        receiver.decrypt().unwrap();
        let before = signature_checks();

        let err = receiver.verify().unwrap_err();

        assert_eq!(signature_checks(), before + 1);
        assert_eq!(err.reject_reason(), Some(RejectReason::DigestMismatch));
    }

    #[test]
    fn test_verdict_serializes_without_cause() {
        let integrity = serde_json::to_string(&Verdict::Rejected(RejectReason::Integrity)).unwrap();
        let signature =
            serde_json::to_string(&Verdict::Rejected(RejectReason::BadSignature)).unwrap();
        let unwrap = serde_json::to_string(&Verdict::Rejected(RejectReason::Unwrap)).unwrap();

        assert_eq!(integrity, signature);
        assert_eq!(integrity, unwrap);
        assert_eq!(integrity, r#"{"Rejected":"verification failed"}"#);
    }

    #[test]
    fn test_wrong_receiver_key_rejected() {
        let mut receiver = ReceiverPipeline::new(sealed(b"42"), ALICE.private(), ALICE.public());

        let err = receiver.unwrap_key().unwrap_err();

        assert_eq!(err.reject_reason(), Some(RejectReason::Unwrap));
        assert_eq!(receiver.stage(), Stage::Rejected);
    }

    #[test]
    fn test_rejection_is_terminal_and_generic() {
        let package = sealed(b"42");
        let tampered = with_parts(&package, Some(flip(package.ciphertext(), 1)), None, None);
        let mut receiver = ReceiverPipeline::new(tampered, BOB.private(), ALICE.public());

        receiver.unwrap_key().unwrap();
        let err = receiver.decrypt().unwrap_err();

        let bad_signature = Error::Rejected {
            reason: RejectReason::BadSignature,
        };
        assert_eq!(err.to_string(), bad_signature.to_string());
        assert!(receiver.plaintext().is_none());
        assert!(matches!(
            receiver.verify(),
            Err(Error::Sequence {
                current: Stage::Rejected,
                ..
            })
        ));
        assert!(matches!(
            receiver.run(&RunControl::new()),
            Err(Error::Sequence { .. })
        ));
        assert!(matches!(
            receiver.into_opened(),
            Err(Error::Rejected {
                reason: RejectReason::Integrity
            })
        ));
    }

    #[test]
    fn test_reports_mark_failed_stage() {
        let package = sealed(b"42");
        let tampered = with_parts(&package, Some(flip(package.ciphertext(), 0)), None, None);
        let mut receiver = ReceiverPipeline::new(tampered, BOB.private(), ALICE.public());

        let _ = receiver.run(&RunControl::new());

        let reports = receiver.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].passed);
        assert_eq!(reports[1].stage, Stage::Decrypted);
        assert!(!reports[1].passed);
    }

    #[test]
    fn test_run_cancelled_keeps_state() {
        let mut receiver = ReceiverPipeline::new(sealed(b"42"), BOB.private(), ALICE.public());
        receiver.unwrap_key().unwrap();
        let control = RunControl::new();
        control.cancel();

        let err = receiver.run(&control).unwrap_err();

        assert!(matches!(err, Error::Cancelled(Stage::Decrypted)));
        assert_eq!(receiver.stage(), Stage::KeyUnwrapped);

        assert_eq!(receiver.run(&RunControl::new()).unwrap(), b"42");
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let bytes = sealed(b"42").to_bytes();

        let (result, verdict, _) = run(disassemble(&bytes).unwrap());

        assert_eq!(result.unwrap(), b"42");
        assert_eq!(verdict, Verdict::Verified);
    }

    #[test]
    fn test_metadata_helper_is_consistent() {
        let package = sealed(b"42");
        assert_eq!(
            package.metadata(),
            &PackageMetadata::new(crypto::hash(b"42"), Some("exam-answers.txt".into()))
        );
    }
}

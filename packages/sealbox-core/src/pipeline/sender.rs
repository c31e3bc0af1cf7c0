//! Sender side: plaintext in, package out.

use std::fmt;
use std::mem;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::crypto::{
    self, generate_rsa_keypair, generate_symmetric_key, Digest, KeyPair, Nonce, PublicKey,
    Signature, SymmetricKey, WrappedKey,
};
use crate::error::{Error, Result};
use crate::package::{self, Package, PackageMetadata, MAX_FILE_NAME_LEN};
use crate::pipeline::{RunControl, SealOutput, Stage, StageReport};

/// Data held at each sender stage.
///
/// The sender's private key lives only until the digest is signed. The
/// session key lives only until it is wrapped; dropping it zeroizes it.
enum SenderState {
    Idle,
    KeysReady {
        sender: KeyPair,
        session_key: SymmetricKey,
    },
    DigestComputed {
        sender: KeyPair,
        session_key: SymmetricKey,
        digest: Digest,
    },
    Signed {
        sender_public: PublicKey,
        session_key: SymmetricKey,
        digest: Digest,
        signature: Signature,
    },
    Encrypted {
        sender_public: PublicKey,
        session_key: SymmetricKey,
        digest: Digest,
        signature: Signature,
        ciphertext: Vec<u8>,
        iv: Nonce,
    },
    KeyWrapped {
        sender_public: PublicKey,
        digest: Digest,
        signature: Signature,
        ciphertext: Vec<u8>,
        iv: Nonce,
        wrapped_key: WrappedKey,
    },
    Packaged {
        sender_public: PublicKey,
        package: Package,
    },
}

impl SenderState {
    fn stage(&self) -> Stage {
        match self {
            SenderState::Idle => Stage::Idle,
            SenderState::KeysReady { .. } => Stage::KeysReady,
            SenderState::DigestComputed { .. } => Stage::DigestComputed,
            SenderState::Signed { .. } => Stage::Signed,
            SenderState::Encrypted { .. } => Stage::Encrypted,
            SenderState::KeyWrapped { .. } => Stage::KeyWrapped,
            SenderState::Packaged { .. } => Stage::Packaged,
        }
    }
}

/// Drives one plaintext through key generation, hashing, signing,
/// encryption, key wrapping and packaging
///
/// ## Example
///
/// ```ignore
/// let mut pipeline = SenderPipeline::new(b"42", EngineConfig::default())
///     .with_file_name("exam-answers.txt")?;
/// pipeline.run(&recipient_public, &RunControl::new())?;
/// let sealed = pipeline.into_output()?;
/// ```
pub struct SenderPipeline<'a> {
    plaintext: &'a [u8],
    file_name: Option<String>,
    config: EngineConfig,
    state: SenderState,
    reports: Vec<StageReport>,
}

impl<'a> SenderPipeline<'a> {
    /// Start an idle pipeline over `plaintext`
    pub fn new(plaintext: &'a [u8], config: EngineConfig) -> Self {
        Self {
            plaintext,
            file_name: None,
            config,
            state: SenderState::Idle,
            reports: Vec::new(),
        }
    }

    /// Record a file name in the package metadata
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Result<Self> {
        let file_name = file_name.into();
        if file_name.is_empty() || file_name.len() > MAX_FILE_NAME_LEN {
            return Err(Error::Format(format!(
                "file name must be 1-{} bytes, got {}",
                MAX_FILE_NAME_LEN,
                file_name.len()
            )));
        }
        self.file_name = Some(file_name);
        Ok(self)
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Every stage attempted so far, in order
    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    /// The sender's public key, once keys exist
    pub fn sender_public_key(&self) -> Option<&PublicKey> {
        match &self.state {
            SenderState::Idle => None,
            SenderState::KeysReady { sender, .. } | SenderState::DigestComputed { sender, .. } => {
                Some(sender.public())
            }
            SenderState::Signed { sender_public, .. }
            | SenderState::Encrypted { sender_public, .. }
            | SenderState::KeyWrapped { sender_public, .. }
            | SenderState::Packaged { sender_public, .. } => Some(sender_public),
        }
    }

    /// The plaintext digest, once computed
    pub fn digest(&self) -> Option<&Digest> {
        match &self.state {
            SenderState::Idle | SenderState::KeysReady { .. } => None,
            SenderState::DigestComputed { digest, .. }
            | SenderState::Signed { digest, .. }
            | SenderState::Encrypted { digest, .. }
            | SenderState::KeyWrapped { digest, .. } => Some(digest),
            SenderState::Packaged { package, .. } => Some(&package.metadata().digest),
        }
    }

    /// The assembled package, once packaged
    pub fn packaged(&self) -> Option<&Package> {
        match &self.state {
            SenderState::Packaged { package, .. } => Some(package),
            _ => None,
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// `Idle → KeysReady`: generate a sender key pair and a session key
    pub fn generate_keys(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::Idle => {
                let keys = generate_rsa_keypair(self.config.rsa_bits).and_then(|sender| {
                    generate_symmetric_key(self.config.symmetric_bits)
                        .map(|session_key| (sender, session_key))
                });
                match keys {
                    Ok((sender, session_key)) => {
                        self.advance(SenderState::KeysReady {
                            sender,
                            session_key,
                        });
                        Ok(())
                    }
                    Err(err) => Err(self.fail(Stage::KeysReady, err)),
                }
            }
            other => Err(self.out_of_order(Stage::KeysReady, other)),
        }
    }

    /// `Idle → KeysReady`: use an existing sender key pair, generate only the
    /// session key
    pub fn load_keys(&mut self, sender: KeyPair) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::Idle => match generate_symmetric_key(self.config.symmetric_bits) {
                Ok(session_key) => {
                    debug!(fingerprint = %sender.public().fingerprint(), "loaded sender key pair");
                    self.advance(SenderState::KeysReady {
                        sender,
                        session_key,
                    });
                    Ok(())
                }
                Err(err) => Err(self.fail(Stage::KeysReady, err)),
            },
            other => Err(self.out_of_order(Stage::KeysReady, other)),
        }
    }

    /// `KeysReady → DigestComputed`: hash the plaintext
    pub fn compute_digest(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::KeysReady {
                sender,
                session_key,
            } => {
                let digest = crypto::hash(self.plaintext);
                debug!(bytes = self.plaintext.len(), digest = %digest, "computed digest");
                self.advance(SenderState::DigestComputed {
                    sender,
                    session_key,
                    digest,
                });
                Ok(())
            }
            other => Err(self.out_of_order(Stage::DigestComputed, other)),
        }
    }

    /// `DigestComputed → Signed`: sign the digest, then drop the private key
    pub fn sign(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::DigestComputed {
                sender,
                session_key,
                digest,
            } => match crypto::sign(&digest, sender.private()) {
                Ok(signature) => {
                    debug!(signature_len = signature.len(), "signed digest");
                    self.advance(SenderState::Signed {
                        sender_public: sender.public().clone(),
                        session_key,
                        digest,
                        signature,
                    });
                    Ok(())
                }
                Err(err) => {
                    self.state = SenderState::DigestComputed {
                        sender,
                        session_key,
                        digest,
                    };
                    Err(self.fail(Stage::Signed, err))
                }
            },
            other => Err(self.out_of_order(Stage::Signed, other)),
        }
    }

    /// `Signed → Encrypted`: encrypt the plaintext under the session key
    pub fn encrypt(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::Signed {
                sender_public,
                session_key,
                digest,
                signature,
            } => match crypto::encrypt(self.plaintext, &session_key) {
                Ok((ciphertext, iv)) => {
                    debug!(ciphertext_len = ciphertext.len(), "encrypted plaintext");
                    self.advance(SenderState::Encrypted {
                        sender_public,
                        session_key,
                        digest,
                        signature,
                        ciphertext,
                        iv,
                    });
                    Ok(())
                }
                Err(err) => {
                    self.state = SenderState::Signed {
                        sender_public,
                        session_key,
                        digest,
                        signature,
                    };
                    Err(self.fail(Stage::Encrypted, err))
                }
            },
            other => Err(self.out_of_order(Stage::Encrypted, other)),
        }
    }

    /// `Encrypted → KeyWrapped`: wrap the session key for `recipient`, then
    /// drop it
    pub fn wrap_key(&mut self, recipient: &PublicKey) -> Result<()> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::Encrypted {
                sender_public,
                session_key,
                digest,
                signature,
                ciphertext,
                iv,
            } => match crypto::wrap(&session_key, recipient) {
                Ok(wrapped_key) => {
                    debug!(recipient = %recipient.fingerprint(), "wrapped session key");
                    drop(session_key);
                    self.advance(SenderState::KeyWrapped {
                        sender_public,
                        digest,
                        signature,
                        ciphertext,
                        iv,
                        wrapped_key,
                    });
                    Ok(())
                }
                Err(err) => {
                    self.state = SenderState::Encrypted {
                        sender_public,
                        session_key,
                        digest,
                        signature,
                        ciphertext,
                        iv,
                    };
                    Err(self.fail(Stage::KeyWrapped, err))
                }
            },
            other => Err(self.out_of_order(Stage::KeyWrapped, other)),
        }
    }

    /// `KeyWrapped → Packaged`: assemble the package
    pub fn package(&mut self) -> Result<&Package> {
        match mem::replace(&mut self.state, SenderState::Idle) {
            SenderState::KeyWrapped {
                sender_public,
                digest,
                signature,
                ciphertext,
                iv,
                wrapped_key,
            } => {
                let metadata = PackageMetadata::new(digest, self.file_name.clone());
                if let Err(err) =
                    package::check_parts(&ciphertext, &wrapped_key, &signature, &metadata)
                {
                    self.state = SenderState::KeyWrapped {
                        sender_public,
                        digest,
                        signature,
                        ciphertext,
                        iv,
                        wrapped_key,
                    };
                    return Err(self.fail(Stage::Packaged, err));
                }

                let package = package::assemble(ciphertext, iv, wrapped_key, signature, metadata)?;
                info!(
                    plaintext_len = self.plaintext.len(),
                    ciphertext_len = package.ciphertext().len(),
                    sender = %sender_public.fingerprint(),
                    "package sealed"
                );
                self.advance(SenderState::Packaged {
                    sender_public,
                    package,
                });
                self.packaged()
                    .ok_or_else(|| Error::Internal("package missing after assembly".into()))
            }
            other => Err(self.out_of_order(Stage::Packaged, other)),
        }
    }

    // ========================================================================
    // DRIVER
    // ========================================================================

    /// Run every remaining stage, generating keys if none were loaded
    ///
    /// `control` is checked before each stage. On timeout or cancellation
    /// the pipeline stays at the last completed stage and `run` can be
    /// called again to resume.
    pub fn run(&mut self, recipient: &PublicKey, control: &RunControl) -> Result<&Package> {
        loop {
            let next = match self.stage() {
                Stage::Idle => Stage::KeysReady,
                Stage::KeysReady => Stage::DigestComputed,
                Stage::DigestComputed => Stage::Signed,
                Stage::Signed => Stage::Encrypted,
                Stage::Encrypted => Stage::KeyWrapped,
                Stage::KeyWrapped => Stage::Packaged,
                _ => break,
            };
            control.check(next)?;

            match next {
                Stage::KeysReady => self.generate_keys()?,
                Stage::DigestComputed => self.compute_digest()?,
                Stage::Signed => self.sign()?,
                Stage::Encrypted => self.encrypt()?,
                Stage::KeyWrapped => self.wrap_key(recipient)?,
                _ => {
                    self.package()?;
                }
            }
        }

        self.packaged()
            .ok_or_else(|| Error::Internal("sender pipeline stopped before packaging".into()))
    }

    /// Consume a packaged pipeline
    pub fn into_output(self) -> Result<SealOutput> {
        match self.state {
            SenderState::Packaged {
                sender_public,
                package,
            } => Ok(SealOutput {
                package,
                sender_public,
                reports: self.reports,
            }),
            other => Err(Error::Sequence {
                attempted: Stage::Packaged,
                current: other.stage(),
            }),
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn advance(&mut self, state: SenderState) {
        let stage = state.stage();
        self.state = state;
        self.reports.push(StageReport::passed(stage));
    }

    fn fail(&mut self, stage: Stage, err: Error) -> Error {
        debug!(stage = %stage, error = %err, "sender stage failed");
        self.reports.push(StageReport::failed(stage, &err));
        err
    }

    fn out_of_order(&mut self, attempted: Stage, current: SenderState) -> Error {
        let err = Error::Sequence {
            attempted,
            current: current.stage(),
        };
        self.state = current;
        err
    }
}

impl fmt::Debug for SenderPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderPipeline")
            .field("stage", &self.stage())
            .field("plaintext_len", &self.plaintext.len())
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

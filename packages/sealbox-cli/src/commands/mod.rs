//! Subcommand implementations and the file helpers they share.

pub mod hash;
pub mod inspect;
pub mod keygen;
pub mod open;
pub mod seal;

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use sealbox_core::package::disassemble;
use sealbox_core::{EngineConfig, Package, PrivateKey, PublicKey};

use crate::output::Printer;

/// Settings shared by every command
pub struct Context {
    pub config: EngineConfig,
    pub printer: Printer,
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

pub(crate) fn read_public_key(path: &Path) -> Result<PublicKey> {
    let bytes = read_file(path)?;
    PublicKey::parse(&bytes).wrap_err_with(|| format!("{} is not an RSA public key", path.display()))
}

pub(crate) fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let bytes = read_file(path)?;
    PrivateKey::parse(&bytes)
        .wrap_err_with(|| format!("{} is not an RSA private key", path.display()))
}

/// Parse a binary or armored package file
pub(crate) fn read_package(path: &Path) -> Result<Package> {
    let bytes = read_file(path)?;
    let package = if Package::is_armored(&bytes) {
        let text = std::str::from_utf8(&bytes)
            .wrap_err_with(|| format!("{} is not valid UTF-8", path.display()))?;
        Package::from_armored(text)
    } else {
        disassemble(&bytes)
    };
    package.wrap_err_with(|| format!("{} is not a sealbox package", path.display()))
}

/// Write `contents`, refusing to replace an existing file unless `force`
pub(crate) fn write_file(path: &Path, contents: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        color_eyre::eyre::bail!("{} already exists (use --force to replace it)", path.display());
    }
    std::fs::write(path, contents).wrap_err_with(|| format!("failed to write {}", path.display()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn context() -> Context {
        Context {
            config: EngineConfig::default(),
            printer: Printer::new(true),
        }
    }

    #[tokio::test]
    async fn test_keygen_seal_inspect_open() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();

        for name in ["alice", "bob"] {
            keygen::run(
                keygen::KeygenArgs {
                    out: dir.path().to_path_buf(),
                    name: name.into(),
                    force: false,
                },
                &ctx,
            )
            .unwrap();
        }

        let input = dir.path().join("exam-answers.txt");
        std::fs::write(&input, b"42").unwrap();

        seal::run(
            seal::SealArgs {
                files: vec![input.clone()],
                to: dir.path().join("bob.pub.pem"),
                sign_with: Some(dir.path().join("alice.key.pem")),
                out: None,
                armor: true,
                force: false,
            },
            &ctx,
        )
        .await
        .unwrap();

        let package_path = dir.path().join("exam-answers.txt.sbx.asc");
        let package = read_package(&package_path).unwrap();
        assert_eq!(
            package.metadata().file_name.as_deref(),
            Some("exam-answers.txt")
        );

        inspect::run(
            inspect::InspectArgs {
                package: package_path.clone(),
            },
            &ctx,
        )
        .unwrap();

        let recovered = dir.path().join("recovered.txt");
        open::run(
            open::OpenArgs {
                package: package_path,
                key: dir.path().join("bob.key.pem"),
                from: dir.path().join("alice.pub.pem"),
                out: Some(recovered.clone()),
                force: false,
            },
            &ctx,
        )
        .unwrap();

        assert_eq!(std::fs::read(recovered).unwrap(), b"42");
    }

    #[tokio::test]
    async fn test_open_with_wrong_sender_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();

        for name in ["alice", "bob", "mallory"] {
            keygen::run(
                keygen::KeygenArgs {
                    out: dir.path().to_path_buf(),
                    name: name.into(),
                    force: false,
                },
                &ctx,
            )
            .unwrap();
        }

        let input = dir.path().join("notes.bin");
        std::fs::write(&input, [0u8, 1, 2, 3]).unwrap();
        seal::run(
            seal::SealArgs {
                files: vec![input],
                to: dir.path().join("bob.pub.pem"),
                sign_with: Some(dir.path().join("mallory.key.pem")),
                out: None,
                armor: false,
                force: false,
            },
            &ctx,
        )
        .await
        .unwrap();

        let recovered: PathBuf = dir.path().join("out.bin");
        let result = open::run(
            open::OpenArgs {
                package: dir.path().join("notes.bin.sbx"),
                key: dir.path().join("bob.key.pem"),
                from: dir.path().join("alice.pub.pem"),
                out: Some(recovered.clone()),
                force: false,
            },
            &ctx,
        );

        assert!(result.is_err());
        assert!(!recovered.exists());
    }

    #[test]
    fn test_write_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing");
        std::fs::write(&path, b"old").unwrap();

        assert!(write_file(&path, b"new", false).is_err());
        write_file(&path, b"new", true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_read_package_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.sbx");
        std::fs::write(&path, b"definitely not a package").unwrap();

        assert!(read_package(&path).is_err());
    }
}

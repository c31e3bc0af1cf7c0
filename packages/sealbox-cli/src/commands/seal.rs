//! `sealbox seal`

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use sealbox_core::batch::{seal_batch, SealJob};
use sealbox_core::{KeyPair, PrivateKey, RunControl, SealOutput, StageReport};
use serde::Serialize;

use super::{read_file, read_public_key, write_file, Context};

#[derive(Args, Debug)]
pub struct SealArgs {
    /// Files to seal; each becomes its own package
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Recipient's public key (PEM or DER)
    #[arg(long)]
    pub to: PathBuf,

    /// Sender's private key. A new key pair is generated per file when omitted
    /// and its public half is written next to the package.
    #[arg(long)]
    pub sign_with: Option<PathBuf>,

    /// Directory for the packages (default: next to each input)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write base64 armored text instead of binary
    #[arg(long)]
    pub armor: bool,

    /// Replace existing packages
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct SealedFile {
    input: PathBuf,
    package: Option<PathBuf>,
    sender_public_key: Option<PathBuf>,
    stages: Vec<StageReport>,
    error: Option<String>,
}

pub async fn run(args: SealArgs, ctx: &Context) -> Result<()> {
    let recipient = read_public_key(&args.to)?;
    let signer = match &args.sign_with {
        Some(path) => Some((path, read_file(path)?)),
        None => None,
    };

    let mut jobs = Vec::with_capacity(args.files.len());
    for input in &args.files {
        // KeyPair is not Clone, so each job parses its own copy
        let sender = signer
            .as_ref()
            .map(|(path, pem)| {
                PrivateKey::parse(pem)
                    .map(KeyPair::from_private)
                    .wrap_err_with(|| format!("{} is not an RSA private key", path.display()))
            })
            .transpose()?;
        jobs.push(SealJob {
            plaintext: read_file(input)?,
            file_name: file_name_of(input),
            recipient: recipient.clone(),
            sender,
        });
    }

    let results = seal_batch(jobs, &ctx.config, &RunControl::new()).await?;

    let mut summaries = Vec::with_capacity(results.len());
    let mut failures = 0;
    for (input, result) in args.files.iter().zip(results) {
        let summary = match result {
            Ok(output) => save(input, output, &args)?,
            Err(err) => {
                failures += 1;
                SealedFile {
                    input: input.clone(),
                    package: None,
                    sender_public_key: None,
                    stages: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };

        ctx.printer.heading(&summary.input.display().to_string());
        ctx.printer.stages(&summary.stages);
        if let Some(package) = &summary.package {
            ctx.printer.line("package", package.display());
        }
        if let Some(key) = &summary.sender_public_key {
            ctx.printer.line("sender key", key.display());
        }
        if let Some(error) = &summary.error {
            ctx.printer.line("error", error);
        }
        summaries.push(summary);
    }

    ctx.printer.json(&summaries)?;

    if failures > 0 {
        bail!("{} of {} files could not be sealed", failures, args.files.len());
    }
    Ok(())
}

fn save(input: &Path, output: SealOutput, args: &SealArgs) -> Result<SealedFile> {
    let dir = match &args.out {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
            dir.clone()
        }
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let stem = input
        .file_name()
        .ok_or_else(|| eyre!("{} has no file name", input.display()))?
        .to_string_lossy()
        .into_owned();

    let extension = if args.armor { "sbx.asc" } else { "sbx" };
    let package_path = dir.join(format!("{}.{}", stem, extension));
    let bytes = if args.armor {
        output.package.to_armored().into_bytes()
    } else {
        output.package.to_bytes()
    };
    write_file(&package_path, &bytes, args.force)?;

    let sender_public_key = if args.sign_with.is_none() {
        let path = dir.join(format!("{}.sender.pub.pem", stem));
        write_file(&path, output.sender_public.to_pem()?.as_bytes(), args.force)?;
        Some(path)
    } else {
        None
    };

    tracing::info!(
        input = %input.display(),
        package = %package_path.display(),
        sender = %output.sender_public.fingerprint(),
        "sealed file"
    );

    Ok(SealedFile {
        input: input.to_path_buf(),
        package: Some(package_path),
        sender_public_key,
        stages: output.reports,
        error: None,
    })
}

/// File name recorded in the package; skipped when it does not fit
fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name.len() <= sealbox_core::package::MAX_FILE_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of() {
        assert_eq!(
            file_name_of(Path::new("/tmp/exam-answers.txt")).as_deref(),
            Some("exam-answers.txt")
        );
        assert_eq!(file_name_of(Path::new("/")), None);

        let long = format!("/tmp/{}", "x".repeat(300));
        assert_eq!(file_name_of(Path::new(&long)), None);
    }
}

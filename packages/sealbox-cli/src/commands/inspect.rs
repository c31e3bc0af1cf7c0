//! `sealbox inspect`

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::Result;
use sealbox_core::package::PACKAGE_VERSION;
use sealbox_core::{Digest, Package};
use serde::Serialize;

use super::{read_package, Context};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Package to describe (binary or armored)
    pub package: PathBuf,
}

/// What can be learned from a package without any keys
#[derive(Debug, Serialize, PartialEq, Eq)]
struct PackageSummary {
    format_version: u8,
    digest_algorithm: &'static str,
    cipher_algorithm: &'static str,
    file_name: Option<String>,
    digest: Digest,
    ciphertext_bytes: usize,
    wrapped_key_bytes: usize,
    signature_bytes: usize,
}

impl From<&Package> for PackageSummary {
    fn from(package: &Package) -> Self {
        let metadata = package.metadata();
        Self {
            format_version: PACKAGE_VERSION,
            digest_algorithm: metadata.digest_algorithm.name(),
            cipher_algorithm: metadata.cipher_algorithm.name(),
            file_name: metadata.file_name.clone(),
            digest: metadata.digest,
            ciphertext_bytes: package.ciphertext().len(),
            wrapped_key_bytes: package.wrapped_key().len(),
            signature_bytes: package.signature().len(),
        }
    }
}

pub fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let package = read_package(&args.package)?;
    let summary = PackageSummary::from(&package);

    ctx.printer.heading(&args.package.display().to_string());
    ctx.printer.line("format", summary.format_version);
    ctx.printer.line("digest alg", summary.digest_algorithm);
    ctx.printer.line("cipher", summary.cipher_algorithm);
    ctx.printer
        .line("file name", summary.file_name.as_deref().unwrap_or("(none)"));
    ctx.printer.line("signed digest", summary.digest);
    ctx.printer.line("ciphertext", format!("{} bytes", summary.ciphertext_bytes));
    ctx.printer.line("wrapped key", format!("{} bytes", summary.wrapped_key_bytes));
    ctx.printer.line("signature", format!("{} bytes", summary.signature_bytes));
    ctx.printer.json(&summary)
}

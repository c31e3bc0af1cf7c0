//! `sealbox open`

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::{bail, Result};
use sealbox_core::{
    Digest, Opened, Package, PrivateKey, PublicKey, ReceiverPipeline, RunControl, StageReport,
    Verdict,
};
use serde::Serialize;

use super::{read_package, read_private_key, read_public_key, write_file, Context};

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Package to open (binary or armored)
    pub package: PathBuf,

    /// Recipient's private key (PEM or DER)
    #[arg(long)]
    pub key: PathBuf,

    /// Sender's public key the signature must match
    #[arg(long)]
    pub from: PathBuf,

    /// Where to write the recovered file (default: the name stored in the
    /// package, next to it)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Verified,
    Rejected,
    Incomplete,
}

#[derive(Debug, Serialize)]
struct OpenedFile {
    package: PathBuf,
    status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    output: Option<PathBuf>,
    digest: Option<Digest>,
}

pub fn run(args: OpenArgs, ctx: &Context) -> Result<()> {
    let package = read_package(&args.package)?;
    let receiver_key = read_private_key(&args.key)?;
    let sender_public = read_public_key(&args.from)?;

    let (mut summary, outcome) = open_package(
        &args.package,
        package,
        &receiver_key,
        &sender_public,
        &ctx.config.run_control(),
    );

    ctx.printer.heading(&args.package.display().to_string());
    ctx.printer.stages(&summary.stages);

    let opened = match outcome {
        Ok(opened) => opened,
        Err(err) => {
            ctx.printer.line("error", &err);
            ctx.printer.json(&summary)?;
            bail!("{}: {}", args.package.display(), err);
        }
    };

    let output = match args.out {
        Some(path) => path,
        None => default_output(&args.package, opened.file_name.as_deref()),
    };
    write_file(&output, &opened.plaintext, args.force)?;

    tracing::info!(output = %output.display(), digest = %opened.digest, "opened package");

    ctx.printer.line("sha256", opened.digest);
    ctx.printer.line("written to", output.display());
    summary.digest = Some(opened.digest);
    summary.output = Some(output);
    ctx.printer.json(&summary)
}

/// Run the receiver pipeline over `package` and summarize the outcome
///
/// A rejected package is summarized without its stage reports, so every
/// verification failure renders identically. The cause is only logged.
fn open_package(
    label: &Path,
    package: Package,
    receiver_key: &PrivateKey,
    sender_public: &PublicKey,
    control: &RunControl,
) -> (OpenedFile, sealbox_core::Result<Opened>) {
    let mut pipeline = ReceiverPipeline::new(package, receiver_key, sender_public);
    let outcome = pipeline.run(control).map(|_| ());

    let status = match pipeline.verdict() {
        Verdict::Verified => Status::Verified,
        Verdict::Rejected(_) => Status::Rejected,
        Verdict::Pending => Status::Incomplete,
    };
    let summary = OpenedFile {
        package: label.to_path_buf(),
        status,
        stages: match status {
            Status::Rejected => Vec::new(),
            _ => pipeline.reports().to_vec(),
        },
        error: outcome.as_ref().err().map(ToString::to_string),
        output: None,
        digest: None,
    };

    (summary, outcome.and_then(|()| pipeline.into_opened()))
}

/// The stored file name in the package's directory, or the package path
/// without its `.sbx` / `.sbx.asc` suffix
fn default_output(package: &Path, stored_name: Option<&str>) -> PathBuf {
    let dir = package.parent().unwrap_or_else(|| Path::new("."));

    // only the final component of a stored name is trusted
    if let Some(name) = stored_name.and_then(|n| Path::new(n).file_name()) {
        return dir.join(name);
    }

    let file = package
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = file
        .strip_suffix(".sbx.asc")
        .or_else(|| file.strip_suffix(".sbx"))
        .filter(|s| !s.is_empty());
    match stripped {
        Some(stem) => dir.join(stem),
        None => dir.join(format!("{}.opened", file)),
    }
}

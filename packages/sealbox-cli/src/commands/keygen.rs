//! `sealbox keygen`

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use sealbox_core::crypto::generate_rsa_keypair;
use sealbox_core::KeyPair;
use serde::Serialize;

use super::{write_file, Context};

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory to write the key files into
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// File stem: writes <NAME>.pub.pem and <NAME>.key.pem
    #[arg(long, default_value = "sealbox")]
    pub name: String,

    /// Replace existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct KeyFiles {
    public_key: PathBuf,
    private_key: PathBuf,
    bits: u32,
    fingerprint: String,
}

pub fn run(args: KeygenArgs, ctx: &Context) -> Result<()> {
    let pair = generate_rsa_keypair(ctx.config.rsa_bits).wrap_err("key generation failed")?;
    let files = write_keypair(&pair, &args.out, &args.name, args.force)?;

    tracing::info!(fingerprint = %files.fingerprint, "key pair written");

    ctx.printer.heading("Generated RSA key pair");
    ctx.printer.line("bits", files.bits);
    ctx.printer.line("fingerprint", &files.fingerprint);
    ctx.printer.line("public key", files.public_key.display());
    ctx.printer.line("private key", files.private_key.display());
    ctx.printer.json(&files)
}

fn write_keypair(pair: &KeyPair, dir: &Path, name: &str, force: bool) -> Result<KeyFiles> {
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("failed to create {}", dir.display()))?;

    let public_key = dir.join(format!("{}.pub.pem", name));
    let private_key = dir.join(format!("{}.key.pem", name));

    write_file(&public_key, pair.public().to_pem()?.as_bytes(), force)?;
    write_private(&private_key, pair.private().to_pem()?.as_bytes(), force)?;

    Ok(KeyFiles {
        public_key,
        private_key,
        bits: pair.bits(),
        fingerprint: pair.public().fingerprint(),
    })
}

/// Write a private key readable only by its owner
#[cfg(unix)]
fn write_private(path: &Path, pem: &[u8], force: bool) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).mode(0o600);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options
        .open(path)
        .wrap_err_with(|| format!("failed to create {}", path.display()))?;
    file.write_all(pem)
        .wrap_err_with(|| format!("failed to write {}", path.display()))
}

#[cfg(not(unix))]
fn write_private(path: &Path, pem: &[u8], force: bool) -> Result<()> {
    write_file(path, pem, force)
}

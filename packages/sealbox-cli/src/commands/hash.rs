//! `sealbox hash`

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use sealbox_core::crypto::{hash_reader, Digest};
use serde::Serialize;

use super::Context;

#[derive(Args, Debug)]
pub struct HashArgs {
    /// File to hash
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct HashOutput {
    file: PathBuf,
    sha256: Digest,
}

pub fn run(args: HashArgs, ctx: &Context) -> Result<()> {
    let file = File::open(&args.file)
        .wrap_err_with(|| format!("failed to open {}", args.file.display()))?;
    let digest = hash_reader(BufReader::new(file))
        .wrap_err_with(|| format!("failed to read {}", args.file.display()))?;

    if !ctx.printer.is_json() {
        println!("{}  {}", digest, args.file.display());
    }
    ctx.printer.json(&HashOutput {
        file: args.file,
        sha256: digest,
    })
}

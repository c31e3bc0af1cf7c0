//! Sealbox command-line front end
//!
//! Reads files and key material from disk, hands bytes to the engine, and
//! prints one pass/fail line per pipeline stage:
//!
//! - `keygen`  - write an RSA key pair as PEM files
//! - `hash`    - stream a file through SHA-256
//! - `seal`    - sign, encrypt and wrap files for one recipient
//! - `open`    - unwrap, decrypt and verify a package
//! - `inspect` - show a package's metadata without opening it

mod commands;
mod output;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use sealbox_core::EngineConfig;

use commands::Context;
use output::Printer;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sealbox", version, about = "Sign, encrypt and verify files with RSA + AES")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Engine parameters, each with an environment fallback
#[derive(Args, Debug)]
struct EngineArgs {
    /// RSA modulus size for generated keys
    #[arg(long, global = true, default_value_t = 2048, env = "SEALBOX_RSA_BITS")]
    rsa_bits: u32,

    /// Abandon a run at the next stage boundary once this many seconds have
    /// passed since it started
    #[arg(long, global = true, env = "SEALBOX_RUN_TIMEOUT_SECS")]
    run_timeout_secs: Option<u64>,

    /// Maximum number of files processed at once
    #[arg(long, global = true, env = "SEALBOX_MAX_PARALLEL")]
    max_parallel: Option<usize>,
}

impl EngineArgs {
    fn to_config(&self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            rsa_bits: self.rsa_bits,
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            max_parallel: self.max_parallel.unwrap_or(defaults.max_parallel),
            ..defaults
        };
        config.validate().wrap_err("invalid engine settings")?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an RSA key pair
    Keygen(commands::keygen::KeygenArgs),
    /// Print the SHA-256 digest of a file
    Hash(commands::hash::HashArgs),
    /// Seal files for a recipient
    Seal(commands::seal::SealArgs),
    /// Open and verify a package
    Open(commands::open::OpenArgs),
    /// Show package metadata
    Inspect(commands::inspect::InspectArgs),
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "sealbox_core=debug,sealbox=debug"
    } else {
        "sealbox_core=info,sealbox=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context {
        config: cli.engine.to_config()?,
        printer: Printer::new(cli.json),
    };
    tracing::debug!(config = ?ctx.config, "engine configured");

    match cli.command {
        Command::Keygen(args) => commands::keygen::run(args, &ctx),
        Command::Hash(args) => commands::hash::run(args, &ctx),
        Command::Seal(args) => commands::seal::run(args, &ctx).await,
        Command::Open(args) => commands::open::run(args, &ctx),
        Command::Inspect(args) => commands::inspect::run(args, &ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_seal_arguments_parse() {
        let cli = Cli::try_parse_from([
            "sealbox",
            "seal",
            "a.txt",
            "b.txt",
            "--to",
            "bob.pub.pem",
            "--armor",
            "--rsa-bits",
            "3072",
        ])
        .unwrap();

        assert_eq!(cli.engine.rsa_bits, 3072);
        match cli.command {
            Command::Seal(args) => {
                assert_eq!(args.files.len(), 2);
                assert!(args.armor);
                assert!(args.sign_with.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_timeout_maps_to_config() {
        let cli = Cli::try_parse_from([
            "sealbox",
            "hash",
            "a.txt",
            "--run-timeout-secs",
            "45",
        ])
        .unwrap();

        let config = cli.engine.to_config().unwrap();
        assert_eq!(config.run_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_invalid_engine_settings_rejected() {
        let args = EngineArgs {
            rsa_bits: 1024,
            run_timeout_secs: None,
            max_parallel: None,
        };

        assert!(args.to_config().is_err());
    }
}

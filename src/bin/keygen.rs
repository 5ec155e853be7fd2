use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use libraryhub::auth::keys::{write_key_pair, KeyEncoding};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Pem,
    Der,
}

impl Format {
    fn encoding(self) -> KeyEncoding {
        match self {
            Format::Pem => KeyEncoding::Pem,
            Format::Der => KeyEncoding::Der,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Format::Pem => "pem",
            Format::Der => "der",
        }
    }
}

/// Generate the signing and encryption RSA key pairs used for LibraryHub tokens
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory the four key files are written to
    #[clap(long, default_value = "./keys")]
    out_dir: PathBuf,

    /// Key file encoding
    #[clap(long, value_enum, default_value = "pem")]
    format: Format,

    /// RSA key length in bits
    #[clap(long, default_value = "2048")]
    length: usize,

    /// Overwrite existing key files
    #[clap(long)]
    force: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.length < 2048 {
        anyhow::bail!("refusing to generate RSA keys shorter than 2048 bits");
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create key directory {:?}", args.out_dir))?;

    let ext = args.format.extension();
    let mut variables = Vec::new();
    for (purpose, var) in [("signing", "JWT_SIGNING"), ("encryption", "JWT_ENCRYPTION")] {
        let private_key = args.out_dir.join(format!("{}.{}", purpose, ext));
        let public_key = args.out_dir.join(format!("{}.pub.{}", purpose, ext));
        for path in [&private_key, &public_key] {
            if path.exists() && !args.force {
                anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
            }
        }

        println!("Generating {} key pair with {} bits...", purpose, args.length);
        write_key_pair(&private_key, &public_key, args.length, args.format.encoding())?;
        println!("Private key written to: {:?}", private_key);
        println!("Public key written to: {:?}", public_key);

        variables.push(format!("{}_PRIVATE_KEY={}", var, private_key.display()));
        variables.push(format!("{}_PUBLIC_KEY={}", var, public_key.display()));
    }

    println!();
    println!("Add these to your environment (or .env):");
    for line in variables {
        println!("{}", line);
    }

    Ok(())
}

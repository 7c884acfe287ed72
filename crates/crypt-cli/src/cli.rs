use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cryptctl",
    about = "Crypto provider toolbox: digests, MACs, key generation and key wrap",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Provider configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List supported algorithms
    Algs(AlgsArgs),
    /// Hash a file or a string
    Digest(DigestArgs),
    /// Compute an HMAC tag
    Mac(MacArgs),
    /// Generate a random symmetric key
    Keygen(KeygenArgs),
    /// Wrap key material under a key-encryption key
    Wrap(WrapArgs),
    /// Unwrap key material
    Unwrap(WrapArgs),
    /// Print the effective provider configuration
    Config,
}

#[derive(Args)]
pub struct AlgsArgs {
    /// Only list algorithms of this family (e.g. "mac", "kem")
    #[arg(long)]
    pub family: Option<String>,
}

#[derive(Args)]
pub struct InputArgs {
    /// Read input from this file
    pub file: Option<PathBuf>,
    /// Use this string as input instead of a file
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,
}

#[derive(Args)]
pub struct DigestArgs {
    #[arg(short, long, default_value = "SHA-256")]
    pub alg: String,
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args)]
pub struct MacArgs {
    #[arg(short, long, default_value = "HMAC-SHA-256")]
    pub alg: String,
    /// Key material, hex
    #[arg(short, long)]
    pub key: String,
    #[command(flatten)]
    pub input: InputArgs,
    /// Expected tag, hex; prints whether it matches
    #[arg(long)]
    pub verify: Option<String>,
}

#[derive(Args)]
pub struct KeygenArgs {
    #[arg(short, long, default_value = "AES-256/GCM")]
    pub alg: String,
}

#[derive(Args)]
pub struct WrapArgs {
    #[arg(short, long, default_value = "AES-256/KWP")]
    pub alg: String,
    /// Key-encryption key, hex
    #[arg(long)]
    pub kek: String,
    /// Key material (wrap) or wrapped blob (unwrap), hex
    pub data: String,
    /// Algorithm of the wrapped key
    #[arg(long, default_value = "AES-256/GCM")]
    pub target: String,
}

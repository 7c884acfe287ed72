use std::fs;

use anyhow::Context;
use colored::Colorize;
use crypt_objects::{CryptoObject, SymmetricKey};
use crypt_provider::{
    BufferedDigest, CryptoProvider, CryptoTransform, Placed, ProviderConfig, StreamStarter,
};
use crypt_types::{fill_to_vec, AlgId, AllowedUsage, CryptoObjectType, ReservedIndex};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    let format = cli.format;
    match cli.command {
        Command::Algs(args) => cmd_algs(args, format),
        Command::Digest(args) => cmd_digest(&provider(config)?, args, format),
        Command::Mac(args) => cmd_mac(&provider(config)?, args, format),
        Command::Keygen(args) => cmd_keygen(&provider(config)?, args, format),
        Command::Wrap(args) => cmd_wrap(&provider(config)?, args, format),
        Command::Unwrap(args) => cmd_unwrap(&provider(config)?, args, format),
        Command::Config => cmd_config(&config),
    }
}

fn provider(config: ProviderConfig) -> anyhow::Result<CryptoProvider> {
    CryptoProvider::new(config).context("provider rejected the configuration")
}

fn read_input(input: &InputArgs) -> anyhow::Result<Vec<u8>> {
    match (&input.text, &input.file) {
        (Some(text), _) => Ok(text.as_bytes().to_vec()),
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("reading {}", path.display()))
        }
        (None, None) => anyhow::bail!("pass a file or --text"),
    }
}

fn parse_hex(label: &str, value: &str) -> anyhow::Result<Vec<u8>> {
    hex::decode(value.trim()).with_context(|| format!("{label} is not valid hex"))
}

fn print_value(format: OutputFormat, label: &str, alg: AlgId, value: &[u8]) {
    match format {
        OutputFormat::Json => {
            let doc = json!({ "alg": alg.name(), label: hex::encode(value) });
            println!("{doc}");
        }
        OutputFormat::Text => {
            println!("{} {}", format!("{alg}").cyan(), hex::encode(value).bold());
        }
    }
}

/// Load bare key material as a symmetric key through a volatile container.
fn raw_symmetric_key(
    provider: &CryptoProvider,
    material: &[u8],
    alg: AlgId,
    usage: AllowedUsage,
) -> anyhow::Result<Placed<SymmetricKey>> {
    let container = provider.alloc_volatile_container(0)?;
    provider
        .import_raw_object(
            &container,
            material,
            alg,
            CryptoObjectType::SymmetricKey,
            usage,
            true,
            None,
        )
        .with_context(|| format!("key does not fit {alg}"))?;
    Ok(provider.load_symmetric_key(&container, ReservedIndex::Heap)?)
}

fn cmd_algs(args: AlgsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let filter = args.family.map(|f| f.to_ascii_lowercase().replace(['-', '_'], ""));
    let algs: Vec<AlgId> = AlgId::all()
        .filter(|alg| match (&filter, alg.family()) {
            (Some(wanted), Some(family)) => {
                format!("{family:?}").to_ascii_lowercase() == *wanted
            }
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();

    if format == OutputFormat::Json {
        let rows: Vec<_> = algs
            .iter()
            .map(|alg| {
                json!({
                    "name": alg.name(),
                    "code": alg.code(),
                    "family": alg.family(),
                    "key_size": alg.key_size(),
                    "digest_size": alg.digest_size(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if algs.is_empty() {
        println!("No algorithms match.");
        return Ok(());
    }
    for alg in algs {
        let family = alg.family().map(|f| format!("{f:?}")).unwrap_or_default();
        println!(
            "  {:<22} {:<18} {}",
            alg.name().bold(),
            family.dimmed(),
            format!("0x{:04x}", alg.code()).yellow()
        );
    }
    Ok(())
}

fn cmd_digest(
    provider: &CryptoProvider,
    args: DigestArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let alg = provider.convert_to_alg_id(&args.alg)?;
    let data = read_input(&args.input)?;
    let mut hash = provider.create_hash_function_ctx(alg, ReservedIndex::Heap)?;
    hash.start(&[])?;
    hash.update(&data)?;
    hash.finish(false)?;
    let mut digest = vec![0u8; hash.digest_size()];
    let n = hash.get_digest(&mut digest, 0)?;
    print_value(format, "digest", alg, &digest[..n]);
    Ok(())
}

fn cmd_mac(provider: &CryptoProvider, args: MacArgs, format: OutputFormat) -> anyhow::Result<()> {
    let alg = provider.convert_to_alg_id(&args.alg)?;
    let material = parse_hex("key", &args.key)?;
    let data = read_input(&args.input)?;
    let usage = AllowedUsage::ALLOW_SIGNATURE | AllowedUsage::ALLOW_VERIFICATION;
    let key = raw_symmetric_key(provider, &material, alg, usage)?;

    let mut mac = provider.create_message_authn_code_ctx(alg, ReservedIndex::Heap)?;
    mac.set_key(&key)?;
    mac.start(&[])?;
    mac.update(&data)?;
    mac.finish(false)?;

    if let Some(expected) = &args.verify {
        let expected = parse_hex("tag", expected)?;
        let matches = mac.compare(&expected, 0)?;
        match format {
            OutputFormat::Json => {
                println!("{}", json!({ "alg": alg.name(), "valid": matches }))
            }
            OutputFormat::Text if matches => println!("{} Tag verified", "✓".green().bold()),
            OutputFormat::Text => println!("{} Tag mismatch", "✗".red().bold()),
        }
        if !matches {
            anyhow::bail!("tag mismatch");
        }
        return Ok(());
    }

    let mut tag = vec![0u8; mac.digest_size()];
    let n = mac.get_digest(&mut tag, 0)?;
    print_value(format, "tag", alg, &tag[..n]);
    Ok(())
}

fn cmd_keygen(
    provider: &CryptoProvider,
    args: KeygenArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let alg = provider.convert_to_alg_id(&args.alg)?;
    let key = provider.generate_symmetric_key(
        alg,
        AllowedUsage::ALLOW_KDF_MATERIAL_ANY_USAGE,
        true,
        true,
        ReservedIndex::Heap,
    )?;
    print_value(format, "key", key.alg_id(), key.material());
    Ok(())
}

fn cmd_wrap(provider: &CryptoProvider, args: WrapArgs, format: OutputFormat) -> anyhow::Result<()> {
    let alg = provider.convert_to_alg_id(&args.alg)?;
    let target = provider.convert_to_alg_id(&args.target)?;
    let kek = raw_symmetric_key(
        provider,
        &parse_hex("kek", &args.kek)?,
        alg,
        AllowedUsage::ALLOW_KEY_EXPORTING,
    )?;
    let key = raw_symmetric_key(
        provider,
        &parse_hex("key", &args.data)?,
        target,
        AllowedUsage::ALLOW_KDF_MATERIAL_ANY_USAGE,
    )?;

    let mut wrapper = provider.create_symmetric_key_wrapper_ctx(alg, ReservedIndex::Heap)?;
    wrapper.set_key(&kek, CryptoTransform::Wrap)?;
    let wrapped = fill_to_vec(|buf| wrapper.wrap_key_material(&*key, buf))?;
    print_value(format, "wrapped", alg, &wrapped);
    Ok(())
}

fn cmd_unwrap(
    provider: &CryptoProvider,
    args: WrapArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let alg = provider.convert_to_alg_id(&args.alg)?;
    let target = provider.convert_to_alg_id(&args.target)?;
    let kek = raw_symmetric_key(
        provider,
        &parse_hex("kek", &args.kek)?,
        alg,
        AllowedUsage::ALLOW_KEY_IMPORTING,
    )?;

    let mut wrapper = provider.create_symmetric_key_wrapper_ctx(alg, ReservedIndex::Heap)?;
    wrapper.set_key(&kek, CryptoTransform::Unwrap)?;
    let key = wrapper
        .unwrap_key(
            &parse_hex("wrapped key", &args.data)?,
            target,
            AllowedUsage::ALLOW_KDF_MATERIAL_ANY_USAGE,
            ReservedIndex::Heap,
        )
        .context("integrity check failed or key does not fit the target")?;
    print_value(format, "key", target, key.material());
    Ok(())
}

fn cmd_config(config: &ProviderConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

//! mkvs CLI - Command line interface for a Merklized key-value store
//!
//! Every invocation opens the store, performs one operation and exits.
//! Mutating commands commit immediately at the next version of the namespace.

use anyhow::Context as _;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use mkvs::{
    Config, Context, FileStore, Namespace, NodeStore, Proof, Root, Tree, VerifiedTree,
};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mkvs")]
#[command(about = "A Merklized key-value store with compact Merkle proofs")]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(short, long, default_value = "state.mkvs")]
    database: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Namespace as 64 hex characters (defaults to the configured one)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Treat keys and values as hex instead of UTF-8 text
    #[arg(long)]
    hex: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database
    Init {
        /// zstd level for stored nodes (0 disables compression)
        #[arg(long)]
        compression_level: Option<i32>,
        /// Replace an existing database instead of refusing
        #[arg(long)]
        force: bool,
    },

    /// Insert or overwrite a key
    Insert {
        /// The key
        key: String,
        /// The value
        value: String,
    },

    /// Get the value stored under a key
    Get {
        /// The key
        key: String,
    },

    /// Remove a key
    Remove {
        /// The key
        key: String,
    },

    /// Show the committed root of the namespace
    Root {
        /// Version to show (defaults to the latest)
        #[arg(long)]
        version: Option<u64>,
    },

    /// Produce a base64 CBOR proof for a key against the latest root
    Prove {
        /// The key
        key: String,
    },

    /// Verify a base64 CBOR proof against a trusted root
    Verify {
        /// Trusted root hash (hex)
        #[arg(long)]
        root: String,
        /// The proof, base64 encoded
        proof: String,
        /// Key to look up in the verified proof
        key: Option<String>,
    },

    /// Show database status
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.database)?;
    init_logging(cli.verbose, &config.log_filter);

    let namespace = match &cli.namespace {
        Some(hex) => Namespace::from_hex(hex).context("invalid namespace")?,
        None => config.namespace,
    };
    let ctx = Context::background();

    match cli.command {
        Commands::Init {
            compression_level,
            force,
        } => {
            if cli.database.exists() && !force {
                output(
                    cli.format,
                    &serde_json::json!({
                        "status": "error",
                        "message": format!(
                            "Database already exists at {} (use --force to replace it)",
                            cli.database.display()
                        )
                    }),
                )?;
                std::process::exit(1);
            }
            let config = Config {
                namespace,
                compression_level: compression_level.unwrap_or(config.compression_level),
                ..config
            };
            config.save(&cli.database)?;
            let store = FileStore::create(&cli.database)?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", cli.database.display()),
                    "namespace": namespace.to_hex()
                }),
            )?;
        }

        Commands::Insert { ref key, ref value } => {
            let key = parse_bytes(key, cli.hex)?;
            let value = parse_bytes(value, cli.hex)?;
            let store = open_store(&cli.database, &config)?;
            let (mut tree, latest) = open_tree(&store, &namespace)?;

            tree.insert(&ctx, &key, &value)?;
            let (root, changed) = commit_next(&ctx, &mut tree, namespace, latest)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": show_bytes(&key, cli.hex),
                    "changed": changed,
                    "version": root.map(|r| r.version),
                    "root": root.map(|r| r.hash.to_hex())
                }),
            )?;
        }

        Commands::Get { ref key } => {
            let key = parse_bytes(key, cli.hex)?;
            let store = open_store(&cli.database, &config)?;
            let (mut tree, _) = open_tree(&store, &namespace)?;

            match tree.get(&ctx, &key) {
                Ok(value) => output(
                    cli.format,
                    &serde_json::json!({
                        "key": show_bytes(&key, cli.hex),
                        "value": show_bytes(&value, cli.hex)
                    }),
                )?,
                Err(mkvs::Error::NotFound(_)) => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": format!("Key not found: {}", show_bytes(&key, cli.hex))
                        }),
                    )?;
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Remove { ref key } => {
            let key = parse_bytes(key, cli.hex)?;
            let store = open_store(&cli.database, &config)?;
            let (mut tree, latest) = open_tree(&store, &namespace)?;

            let removed = tree.remove(&ctx, &key)?;
            let (root, changed) = commit_next(&ctx, &mut tree, namespace, latest)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": show_bytes(&key, cli.hex),
                    "removed": removed.is_some(),
                    "changed": changed,
                    "version": root.map(|r| r.version),
                    "root": root.map(|r| r.hash.to_hex())
                }),
            )?;
        }

        Commands::Root { version } => {
            let store = open_store(&cli.database, &config)?;
            let root = match version {
                Some(version) => store
                    .roots()
                    .into_iter()
                    .find(|r| r.namespace == namespace && r.version == version),
                None => store.latest_root(&namespace)?,
            };
            match root {
                Some(root) => output(
                    cli.format,
                    &serde_json::json!({
                        "namespace": root.namespace.to_hex(),
                        "version": root.version,
                        "root": root.hash.to_hex()
                    }),
                )?,
                None => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": "No committed root"
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Prove { ref key } => {
            let key = parse_bytes(key, cli.hex)?;
            let store = open_store(&cli.database, &config)?;
            let root = store
                .latest_root(&namespace)?
                .ok_or_else(|| anyhow::anyhow!("No commits yet"))?;
            let mut tree = Tree::from_root(&store, root.hash);

            let proof = tree.get_proof(&ctx, &key)?;
            output(
                cli.format,
                &serde_json::json!({
                    "root": root.hash.to_hex(),
                    "version": root.version,
                    "entries": proof.entries.len(),
                    "proof": STANDARD.encode(proof.to_cbor()?)
                }),
            )?;
        }

        Commands::Verify {
            ref root,
            ref proof,
            ref key,
        } => {
            let trusted = mkvs::Hash::from_hex(root).context("invalid root hash")?;
            let raw = STANDARD.decode(proof.trim()).context("proof is not valid base64")?;
            let verified = Proof::from_cbor(&raw).and_then(|p| VerifiedTree::new(&trusted, &p));

            let verified = match verified {
                Ok(verified) => verified,
                Err(e) => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "valid": false,
                            "error": e.to_string()
                        }),
                    )?;
                    std::process::exit(1);
                }
            };

            let mut result = serde_json::json!({ "valid": true, "root": trusted.to_hex() });
            if let Some(key) = key {
                let key = parse_bytes(key, cli.hex)?;
                let value = verified.get(&key)?;
                result["key"] = show_bytes(&key, cli.hex).into();
                result["present"] = value.is_some().into();
                result["value"] = value.map(|v| show_bytes(v, cli.hex)).into();
            }
            output(cli.format, &result)?;
        }

        Commands::Status => {
            let store = open_store(&cli.database, &config)?;
            let latest = store.latest_root(&namespace)?;
            output(
                cli.format,
                &serde_json::json!({
                    "database": cli.database.display().to_string(),
                    "namespace": namespace.to_hex(),
                    "version": latest.map(|r| r.version),
                    "root": latest.map(|r| r.hash.to_hex()),
                    "nodes": store.object_count(),
                    "roots": store.roots().len(),
                    "compression_level": config.compression_level
                }),
            )?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, default_filter: &str) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        1 => EnvFilter::new("mkvs=debug"),
        _ => EnvFilter::new("mkvs=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: &Path, config: &Config) -> anyhow::Result<FileStore> {
    let store = FileStore::open_or_create(path)?.with_compression_level(config.compression_level);
    Ok(store)
}

/// Open the latest committed tree of `namespace` along with its root record
fn open_tree<'a>(
    store: &'a FileStore,
    namespace: &Namespace,
) -> anyhow::Result<(Tree<'a>, Option<Root>)> {
    let latest = store.latest_root(namespace)?;
    let tree = match latest {
        Some(root) => Tree::from_root(store, root.hash),
        None => Tree::new(store),
    };
    debug!(%namespace, latest = ?latest.map(|r| r.version), "opened tree");
    Ok((tree, latest))
}

/// Commit the tree's pending writes as the version after `latest`
///
/// Returns the root that is current afterwards and whether a new version was
/// recorded. A tree without pending writes records nothing.
fn commit_next(
    ctx: &Context,
    tree: &mut Tree<'_>,
    namespace: Namespace,
    latest: Option<Root>,
) -> anyhow::Result<(Option<Root>, bool)> {
    if tree.pending_writes().next().is_none() {
        return Ok((latest, false));
    }
    let version = latest.map_or(0, |root| root.version + 1);
    let hash = tree.commit(ctx, namespace, version)?;
    Ok((Some(Root::new(namespace, version, hash)), true))
}

fn parse_bytes(input: &str, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    if is_hex {
        hex::decode(input).with_context(|| format!("invalid hex: {}", input))
    } else {
        Ok(input.as_bytes().to_vec())
    }
}

/// Render bytes as text when possible, hex otherwise
fn show_bytes(bytes: &[u8], is_hex: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !is_hex => text.to_string(),
        _ => hex::encode(bytes),
    }
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

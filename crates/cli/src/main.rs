//! Filechain command line interface
//!
//! Uploads files to the local encrypted object store, registers them in the
//! local file registry, and decrypts or deletes them with the configured
//! wallet key.

mod settings;

use crate::settings::{AppConfig, Overrides};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use filechain_auth::{KeyFile, LocalWallet};
use filechain_orchestrator::{FlowOutcome, Orchestrator, Progress};
use filechain_registry::LocalRegistryRuntime;
use filechain_store::{LocalObjectStore, ObjectStore, RecordId, DEFAULT_PAGE_SIZE};
use filechain_types::ContentId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type LocalOrchestrator = Orchestrator<LocalObjectStore, LocalRegistryRuntime, LocalWallet>;

#[derive(Parser)]
#[command(name = "filechain")]
#[command(about = "Encrypted file storage with an owner registry", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to <data_dir>/filechain.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Data directory holding the store, the registry and the key file
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Object store API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Wallet key file
    #[arg(long, global = true, value_name = "PATH")]
    key_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `filechain_orchestrator=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new wallet key file
    Init,
    /// Print the wallet address
    Address,
    /// Print the effective configuration as TOML
    Config,
    /// Encrypt, store and register a file
    Upload {
        path: PathBuf,
        /// Name to register instead of the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// List files registered to the wallet
    List,
    /// Recover the plaintext of a registered file
    Decrypt {
        cid: ContentId,
        /// Output path (defaults to the registered name)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },
    /// Remove a file from the store and the registry
    Delete { cid: ContentId },
    /// Raw object store listing, one page at a time
    Uploads {
        /// Record id to continue after
        #[arg(long)]
        cursor: Option<RecordId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(
        cli.config.as_deref(),
        Overrides {
            data_dir: cli.data_dir,
            api_key: cli.api_key,
            key_file: cli.key_file,
            log_level: cli.log_level,
        },
    )?;
    init_logging(&config)?;
    debug!(data_dir = %config.data_dir.display(), "configuration loaded");

    match cli.command {
        Commands::Init => handle_init(&config),
        Commands::Address => handle_address(&config),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Upload { path, name } => handle_upload(&config, &path, name).await,
        Commands::List => handle_list(&config).await,
        Commands::Decrypt { cid, out, force } => handle_decrypt(&config, cid, out, force).await,
        Commands::Delete { cid } => handle_delete(&config, cid).await,
        Commands::Uploads { cursor } => handle_uploads(&config, cursor).await,
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "compact" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

fn handle_init(config: &AppConfig) -> Result<()> {
    let path = config.key_file_path();
    if path.exists() {
        bail!(
            "key file {} already exists; pass --key-file to create another",
            path.display()
        );
    }
    let (keyfile, _wallet) = KeyFile::generate();
    keyfile
        .save(&path)
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    info!(path = %path.display(), "key file created");

    println!("Address: {}", keyfile.address);
    println!("Key file: {}", path.display());
    if let Some(warning) = &keyfile.warning {
        println!("Warning: {warning}");
    }
    Ok(())
}

fn handle_address(config: &AppConfig) -> Result<()> {
    let path = config.key_file_path();
    let keyfile = KeyFile::load(&path)
        .with_context(|| format!("no usable key file at {}; run `filechain init`", path.display()))?;
    println!("{}", keyfile.address);
    Ok(())
}

fn load_wallet(config: &AppConfig) -> Result<LocalWallet> {
    let path = config.key_file_path();
    let keyfile = KeyFile::load(&path)
        .with_context(|| format!("no usable key file at {}; run `filechain init`", path.display()))?;
    Ok(keyfile.unlock()?)
}

fn open_store(config: &AppConfig) -> Result<LocalObjectStore> {
    let dir = config.store_dir();
    LocalObjectStore::open(&dir, config.api_key.clone(), config.challenge_ttl_secs)
        .with_context(|| format!("failed to open object store at {}", dir.display()))
}

fn open_orchestrator(config: &AppConfig) -> Result<LocalOrchestrator> {
    let wallet = load_wallet(config)?;
    let store = open_store(config)?;
    let registry_path = config.registry_path();
    let registry = LocalRegistryRuntime::open(&registry_path, config.challenge_ttl_secs)
        .with_context(|| format!("failed to open registry at {}", registry_path.display()))?;

    Ok(Orchestrator::new(
        Arc::new(store),
        Arc::new(registry),
        Arc::new(wallet),
        config.api_key.clone(),
    ))
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<Progress>) {
    while let Some(progress) = rx.recv().await {
        eprintln!(
            "[{:>3}%] {} {}",
            progress.percent, progress.flow, progress.step
        );
    }
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn finish(outcome: FlowOutcome, detail: Option<&str>) -> Result<()> {
    match (outcome, detail) {
        (FlowOutcome::PartialInconsistency, Some(detail)) => {
            bail!("partial inconsistency: {detail}")
        }
        (FlowOutcome::PartialInconsistency, None) => bail!("partial inconsistency"),
        (outcome, Some(detail)) => {
            println!("{outcome}: {detail}");
            Ok(())
        }
        (outcome, None) => {
            println!("{outcome}");
            Ok(())
        }
    }
}

async fn handle_upload(config: &AppConfig, path: &Path, name: Option<String>) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name; pass --name")?,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));
    let result = orch.upload(&data, &name, &tx).await;
    drop(tx);
    printer.await.ok();

    let report = result?;
    println!("CID: {}", report.cid);
    println!("Store record: {}", report.record_id);
    if let Some(record) = &report.record {
        println!("Registered: {}", format_timestamp(record.timestamp));
    }
    finish(report.outcome, report.detail.as_deref())
}

async fn handle_list(config: &AppConfig) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let files = orch.list_files().await?;
    if files.is_empty() {
        println!("No files registered to {}", orch.owner());
        return Ok(());
    }
    for (index, file) in files.iter().enumerate() {
        println!(
            "{:>3}. {}  {}  {}",
            index + 1,
            file.cid,
            format_timestamp(file.timestamp),
            file.name
        );
    }
    Ok(())
}

async fn handle_decrypt(
    config: &AppConfig,
    cid: ContentId,
    out: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let name = orch
        .list_files()
        .await?
        .into_iter()
        .find(|record| record.cid == cid)
        .map(|record| record.name)
        .unwrap_or_else(|| cid.to_string());

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));
    let result = orch.decrypt(&cid, &name, &tx).await;
    drop(tx);
    printer.await.ok();
    let file = result?;

    let out = out.unwrap_or_else(|| PathBuf::from(&file.name));
    if out.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", out.display());
    }
    tokio::fs::write(&out, &file.bytes)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "Wrote {} bytes ({}) to {}",
        file.bytes.len(),
        file.mime_type,
        out.display()
    );
    Ok(())
}

async fn handle_delete(config: &AppConfig, cid: ContentId) -> Result<()> {
    let orch = open_orchestrator(config)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));
    let result = orch.delete(&cid, &tx).await;
    drop(tx);
    printer.await.ok();

    let report = result?;
    println!("Store records removed: {}", report.removed_records.len());
    finish(report.outcome, report.detail.as_deref())
}

async fn handle_uploads(config: &AppConfig, cursor: Option<RecordId>) -> Result<()> {
    let store = open_store(config)?;
    let page = store.list_uploads(&config.api_key, cursor).await?;

    for record in &page.records {
        println!(
            "{}  {}  {:>10}  {}  {}  {}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.size_bytes,
            record.cid,
            record.mime_type,
            record.file_name
        );
    }
    println!("{} of {} records", page.records.len(), page.total);
    if page.records.len() >= DEFAULT_PAGE_SIZE {
        if let Some(next) = page.next_cursor() {
            println!("Next: filechain uploads --cursor {next}");
        }
    }
    Ok(())
}

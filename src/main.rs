//! SliverNet CLI
//!
//! Command-line access to the blob client.
//!
//! # Commands
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ needs a ledger snapshot  │  read · status · metadata · cost   │
//! ├──────────────────────────┼───────────────────────────────────┤
//! │ offline                  │  route · encoded-length · blob-id  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ctrl-C cancels the running operation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slivernet::adapters::{HttpStorageNodeClient, ReedSolomonBlobCodec, StaticLedger};
use slivernet::domain::ports::BlobCodec;
use slivernet::domain::types::{BlobId, SliverPairIndex};
use slivernet::encoding::{encoded_blob_length, max_faulty, primary_source_symbols, ShardRouter};
use slivernet::{BlobClient, ClientConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// SliverNet - client for erasure-coded blob storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Client configuration file (YAML)
    #[arg(long, env = "SLIVERNET_CONFIG")]
    config: Option<PathBuf>,

    /// Ledger snapshot file (YAML) describing the committee
    #[arg(long, env = "SLIVERNET_LEDGER")]
    ledger: Option<PathBuf>,

    /// Override the per-request timeout (e.g. "30s")
    #[arg(long, env = "SLIVERNET_REQUEST_TIMEOUT")]
    request_timeout: Option<String>,

    /// Override the whole-operation timeout (e.g. "2m")
    #[arg(long, env = "SLIVERNET_OPERATION_TIMEOUT")]
    operation_timeout: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a blob and write it to a file or stdout
    Read {
        blob_id: BlobId,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Print the blob status confirmed by the committee
    Status { blob_id: BlobId },

    /// Print the blob metadata served by the committee
    Metadata { blob_id: BlobId },

    /// Price a blob of the given size
    Cost {
        size: u64,
        #[arg(long, default_value = "1")]
        epochs: u32,
    },

    /// Print the sliver pair to shard mapping of a blob
    Route {
        blob_id: BlobId,
        #[arg(long)]
        shards: u16,
    },

    /// Print the encoded size of a blob
    EncodedLength {
        size: u64,
        #[arg(long)]
        shards: u16,
    },

    /// Compute the blob id of a file
    BlobId {
        file: PathBuf,
        #[arg(long)]
        shards: u16,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    match &args.command {
        Command::Route { blob_id, shards } => route(blob_id, *shards),
        Command::EncodedLength { size, shards } => {
            println!("{}", encoded_blob_length(*size, *shards));
            Ok(())
        }
        Command::BlobId { file, shards } => {
            let blob = std::fs::read(file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let metadata = ReedSolomonBlobCodec::new().compute_metadata(*shards, &blob)?;
            println!("{}", metadata.blob_id);
            Ok(())
        }
        command => {
            let client = build_client(&args)?;
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());
            run_online(&client, command, &cancel).await
        }
    }
}

async fn run_online(
    client: &BlobClient,
    command: &Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Read { blob_id, out } => {
            let blob = client.read_blob(blob_id, cancel).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(path, &blob)
                        .await
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    info!(%blob_id, size = blob.len(), path = %path.display(), "Blob saved");
                }
                None => {
                    use tokio::io::AsyncWriteExt;
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&blob).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Status { blob_id } => {
            let status = client.get_verified_blob_status(blob_id, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Metadata { blob_id } => {
            let metadata = client.get_blob_metadata(blob_id, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Cost { size, epochs } => {
            let cost = client.storage_cost(*size, *epochs).await?;
            println!("{}", serde_json::to_string_pretty(&cost)?);
        }
        Command::Route { .. } | Command::EncodedLength { .. } | Command::BlobId { .. } => {}
    }
    Ok(())
}

fn route(blob_id: &BlobId, shards: u16) -> anyhow::Result<()> {
    anyhow::ensure!(shards > 0, "--shards must be positive");

    let router = ShardRouter::new(blob_id, shards);
    println!(
        "offset {} (f = {}, primary source symbols = {})",
        router.offset(),
        max_faulty(shards),
        primary_source_symbols(shards)
    );
    for pair in 0..shards {
        let pair = SliverPairIndex(pair);
        println!("pair {:>5} -> shard {:>5}", pair, router.shard_index(pair));
    }
    Ok(())
}

fn build_client(args: &Args) -> anyhow::Result<BlobClient> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_yaml_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(timeout) = &args.request_timeout {
        config.request_timeout = timeout.clone();
    }
    if let Some(timeout) = &args.operation_timeout {
        config.operation_timeout = Some(timeout.clone());
    }

    let ledger_path = args
        .ledger
        .as_ref()
        .context("this command needs --ledger (or SLIVERNET_LEDGER)")?;
    let ledger = StaticLedger::from_yaml_file(ledger_path)?;
    let nodes = HttpStorageNodeClient::new(config.request_timeout()?)?;

    info!(ledger = %ledger_path.display(), "Client initialized");

    Ok(BlobClient::new(
        config,
        Arc::new(ledger),
        Arc::new(nodes),
        Arc::new(ReedSolomonBlobCodec::new()),
    )?)
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("rustls=warn".parse()?);

    // Logs go to stderr so `read` can stream the blob to stdout.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

//! `forkup`: deduplicating chunk upload.
//!
//! Uploads the chunks of a local blob, as described by a manifest, to a
//! content-addressable store, skipping every chunk already stored under its
//! hash.
//!
//! # Usage
//!
//! ```text
//! forkup up disk.manifest disk.img                        # sync into ~/.forkup/store
//! forkup up disk.manifest disk.img --store minio://localhost:9000/chunks/disk
//! forkup up disk.manifest disk.img -w 16 --verify-digest sha256
//! forkup verify disk.manifest disk.img --deep             # check the store
//! forkup inspect disk.manifest                            # manifest statistics
//! ```
//!
//! Exit status: 0 when fully synced, 1 when partially synced, 2 when the
//! sync was aborted (bad manifest, blob mismatch, unreachable store).

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forkup_cas::{FileBlob, Manifest, ManifestReader};
use forkup_engine::{SyncOutcome, SyncSession, VerifyMode};
use forkup_store::{ChunkStore, FileStore, MemoryStore, RetryStore, S3Store};
use forkup_types::DigestAlgorithm;
use tracing::{debug, info};

use config::{CliConfig, Resolved, StoreOverrides, StoreTarget, SyncOverrides};

const EXIT_PARTIAL: u8 = 1;
const EXIT_ABORTED: u8 = 2;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "forkup",
    version,
    about = "Deduplicating chunk upload to content-addressable object stores"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the chunks of a blob that the store does not have yet.
    Up {
        /// Manifest: newline-separated or JSON array of `<size>:<hash>` entries.
        manifest: PathBuf,

        /// The blob the manifest describes.
        blob: PathBuf,

        #[command(flatten)]
        store: StoreArgs,

        /// Number of parallel workers (default: available CPUs).
        #[arg(short, long)]
        workers: Option<usize>,

        /// Hash every chunk read and compare it with the manifest.
        #[arg(long, value_name = "ALGORITHM")]
        verify_digest: Option<DigestAlgorithm>,

        /// Publish the manifest under this key prefix after a complete sync.
        #[arg(long)]
        manifest_prefix: Option<String>,
    },

    /// Check that every chunk of a manifest is in the store.
    Verify {
        /// Manifest file.
        manifest: PathBuf,

        /// The blob the manifest describes.
        blob: PathBuf,

        #[command(flatten)]
        store: StoreArgs,

        /// Download every chunk and compare it with the blob.
        #[arg(long)]
        deep: bool,

        /// Number of parallel workers (default: available CPUs).
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print manifest statistics.
    Inspect {
        /// Manifest file.
        manifest: PathBuf,

        /// Print the statistics as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Store selection shared by `up` and `verify`.
#[derive(Args)]
struct StoreArgs {
    /// Store URI: `minio://host:port/bucket[/prefix]`, `s3://host/bucket`,
    /// `file:///dir` or `memory://`.
    #[arg(short, long)]
    store: Option<String>,

    /// S3 endpoint (when not given in --store).
    #[arg(long, env = "FORKUP_S3_ENDPOINT")]
    endpoint: Option<String>,

    /// S3 access key.
    #[arg(long, env = "FORKUP_S3_ACCESS_KEY")]
    access_key: Option<String>,

    /// S3 secret key.
    #[arg(long, env = "FORKUP_S3_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Bucket shared by all blobs.
    #[arg(short, long)]
    bucket: Option<String>,

    /// Use a bucket per blob, named after the blob file.
    #[arg(long, conflicts_with = "bucket")]
    per_blob: bool,
}

impl StoreArgs {
    fn overrides(&self) -> StoreOverrides {
        StoreOverrides {
            uri: self.store.clone(),
            endpoint: self.endpoint.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            bucket: self.bucket.clone(),
            per_blob: self.per_blob,
        }
    }
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load config: {e:#}");
            return ExitCode::from(EXIT_ABORTED);
        }
    };

    setup_tracing(&config.log.level);

    let result = match cli.command {
        Commands::Up {
            manifest,
            blob,
            store,
            workers,
            verify_digest,
            manifest_prefix,
        } => {
            let sync = SyncOverrides {
                workers,
                verify_digest,
                manifest_prefix,
            };
            cmd_up(&config, &manifest, &blob, &store, &sync).await
        }
        Commands::Verify {
            manifest,
            blob,
            store,
            deep,
            workers,
            json,
        } => {
            let sync = SyncOverrides {
                workers,
                ..SyncOverrides::default()
            };
            cmd_verify(&config, &manifest, &blob, &store, &sync, deep, json).await
        }
        Commands::Inspect { manifest, json } => cmd_inspect(&manifest, json).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// -----------------------------------------------------------------------
// Shared setup
// -----------------------------------------------------------------------

async fn load_manifest(path: &Path) -> Result<Manifest> {
    let reader = ManifestReader::open(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest = reader
        .read_all()
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    debug!(path = %path.display(), format = ?reader.format(), chunks = manifest.len(), "loaded manifest");
    Ok(manifest)
}

async fn build_store(resolved: &Resolved) -> Result<Arc<dyn ChunkStore>> {
    let store: Arc<dyn ChunkStore> = match &resolved.target {
        StoreTarget::S3(s3) => {
            info!(endpoint = %s3.endpoint_url(), "using s3 store");
            Arc::new(S3Store::connect(s3.clone()).await)
        }
        StoreTarget::File(root) => {
            info!(root = %root.display(), "using file store");
            Arc::new(
                FileStore::new(root)
                    .with_context(|| format!("failed to open store at {}", root.display()))?,
            )
        }
        StoreTarget::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::unbounded())
        }
    };

    if resolved.retry.max_retries == 0 {
        return Ok(store);
    }
    Ok(Arc::new(RetryStore::new(store, resolved.retry)))
}

async fn open_session(
    config: &CliConfig,
    manifest_path: &Path,
    blob_path: &Path,
    store_args: &StoreArgs,
    sync: &SyncOverrides,
) -> Result<SyncSession> {
    // Parse first: a bad manifest must fail before any store is contacted.
    let manifest = load_manifest(manifest_path).await?;
    let resolved = config.resolve(&store_args.overrides(), sync)?;
    let blob = FileBlob::open(blob_path)
        .with_context(|| format!("failed to open blob {}", blob_path.display()))?;
    let store = build_store(&resolved).await?;
    Ok(SyncSession::for_file(manifest, blob, store, resolved.sync))
}

// -----------------------------------------------------------------------
// forkup up
// -----------------------------------------------------------------------

async fn cmd_up(
    config: &CliConfig,
    manifest: &Path,
    blob: &Path,
    store: &StoreArgs,
    sync: &SyncOverrides,
) -> Result<ExitCode> {
    let session = open_session(config, manifest, blob, store, sync).await?;
    let namespace = session.namespace();
    let report = session.run().await.context("sync aborted")?;

    println!("namespace: {namespace}");
    println!("{report}");
    for key in &report.manifest_keys {
        println!("manifest: {key}");
    }

    Ok(match report.outcome() {
        SyncOutcome::Synced => ExitCode::SUCCESS,
        SyncOutcome::Partial { .. } => ExitCode::from(EXIT_PARTIAL),
    })
}

// -----------------------------------------------------------------------
// forkup verify
// -----------------------------------------------------------------------

async fn cmd_verify(
    config: &CliConfig,
    manifest: &Path,
    blob: &Path,
    store: &StoreArgs,
    sync: &SyncOverrides,
    deep: bool,
    json: bool,
) -> Result<ExitCode> {
    let session = open_session(config, manifest, blob, store, sync).await?;
    let mode = if deep { VerifyMode::Deep } else { VerifyMode::Size };
    let report = session.verify(mode).await.context("verification failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "total={} verified={} missing={} size_mismatch={} content_mismatch={}",
            report.total,
            report.verified,
            report.missing,
            report.size_mismatch,
            report.content_mismatch
        );
        for problem in &report.problems {
            println!("  chunk {} ({}): {:?}", problem.index, problem.hash, problem.kind);
        }
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

// -----------------------------------------------------------------------
// forkup inspect
// -----------------------------------------------------------------------

async fn cmd_inspect(manifest_path: &Path, json: bool) -> Result<ExitCode> {
    let manifest = load_manifest(manifest_path).await?;
    let stats = manifest.stats();
    let dedup_ratio = if stats.total_size == 0 {
        1.0
    } else {
        stats.unique_size as f64 / stats.total_size as f64
    };

    if json {
        let value = serde_json::json!({
            "chunks": stats.chunks,
            "unique_chunks": stats.unique_chunks,
            "total_size": stats.total_size,
            "unique_size": stats.unique_size,
            "dedup_ratio": dedup_ratio,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("chunks:        {}", stats.chunks);
        println!("unique chunks: {}", stats.unique_chunks);
        println!("total size:    {} bytes", stats.total_size);
        println!("unique size:   {} bytes", stats.unique_size);
        println!("dedup ratio:   {dedup_ratio:.3}");
    }
    Ok(ExitCode::SUCCESS)
}

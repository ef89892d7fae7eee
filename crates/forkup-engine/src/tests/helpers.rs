//! Shared test utilities for forkup-engine tests.

use std::sync::Arc;

use forkup_cas::{BlobSource, Manifest, ManifestReader, MemoryBlob, hex_digest};
use forkup_store::{ChunkStore, MemoryStore};
use forkup_types::{ChunkDescriptor, ChunkHash, DigestAlgorithm, Namespace};

use crate::aggregate::SyncReport;
use crate::config::SyncConfig;
use crate::error::EngineError;
use crate::session::SyncSession;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// The default global namespace.
pub fn ns() -> Namespace {
    Namespace::default()
}

/// Parse a JSON manifest from literal tokens.
pub fn manifest_of(tokens: &[&str]) -> Manifest {
    let json = serde_json_array(tokens);
    ManifestReader::new(json).unwrap().read_all().unwrap()
}

fn serde_json_array(tokens: &[&str]) -> String {
    let quoted: Vec<String> = tokens.iter().map(|t| format!("\"{t}\"")).collect();
    format!("[{}]", quoted.join(","))
}

/// Build a manifest cutting `data` into fixed-size chunks hashed with SHA-256.
pub fn chunked_manifest(data: &[u8], chunk_size: usize) -> Manifest {
    let chunks = data
        .chunks(chunk_size)
        .map(|c| ChunkDescriptor {
            size: c.len() as u64,
            hash: ChunkHash::new(hex_digest(DigestAlgorithm::Sha256, c)).unwrap(),
        })
        .collect();
    Manifest::new(chunks)
}

/// A fresh unbounded in-memory store.
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::unbounded())
}

/// A session config with a fixed worker count and otherwise defaults.
pub fn config(workers: usize) -> SyncConfig {
    SyncConfig {
        workers: Some(workers),
        ..SyncConfig::default()
    }
}

/// A session over an in-memory blob.
pub fn session(
    manifest: Manifest,
    data: impl Into<bytes::Bytes>,
    store: Arc<dyn ChunkStore>,
    config: SyncConfig,
) -> SyncSession {
    let blob: Arc<dyn BlobSource> = Arc::new(MemoryBlob::new(data));
    SyncSession::new(manifest, blob, store, config)
}

/// Parse a manifest source and sync it, the way the CLI does.
pub async fn parse_and_sync(
    source: &str,
    data: &[u8],
    store: Arc<dyn ChunkStore>,
) -> Result<SyncReport, EngineError> {
    let manifest = ManifestReader::new(source)?.read_all()?;
    session(manifest, data.to_vec(), store, config(2)).run().await
}

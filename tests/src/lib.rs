//! Shared fixtures for forkup integration tests.
//!
//! [`Fixture`] writes a blob and its manifest into a temporary directory and
//! builds sessions over them, so every test exercises the same file-backed
//! path the CLI uses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use forkup_cas::{FileBlob, Manifest, ManifestReader, hex_digest};
use forkup_engine::{SyncConfig, SyncSession};
use forkup_store::ChunkStore;
use forkup_types::{ChunkDescriptor, ChunkHash, DigestAlgorithm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate deterministic random data from a seed.
pub fn test_data_seeded(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}

/// Cut `data` into fixed-size chunks hashed with SHA-256.
pub fn fixed_size_chunks(data: &[u8], chunk_size: usize) -> Vec<ChunkDescriptor> {
    data.chunks(chunk_size)
        .map(|c| ChunkDescriptor {
            size: c.len() as u64,
            hash: ChunkHash::new(hex_digest(DigestAlgorithm::Sha256, c))
                .expect("hex digest is a valid hash"),
        })
        .collect()
}

/// Render chunk descriptors as a newline-separated manifest.
pub fn lines_manifest(chunks: &[ChunkDescriptor]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&chunk.to_token());
        out.push('\n');
    }
    out
}

/// A blob file plus its manifest file on disk.
pub struct Fixture {
    dir: tempfile::TempDir,
    pub data: Vec<u8>,
    pub chunks: Vec<ChunkDescriptor>,
    pub blob_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl Fixture {
    /// Write a random blob named `name` and a JSON manifest for it.
    pub fn new(name: &str, size: usize, chunk_size: usize, seed: u64) -> Self {
        Self::from_data(name, test_data_seeded(size, seed), chunk_size)
    }

    /// Write the given bytes as blob `name` and a JSON manifest for it.
    pub fn from_data(name: &str, data: Vec<u8>, chunk_size: usize) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let chunks = fixed_size_chunks(&data, chunk_size);
        let blob_path = dir.path().join(name);
        let manifest_path = dir.path().join(format!("{name}.manifest"));
        std::fs::write(&blob_path, &data).expect("write blob");
        std::fs::write(&manifest_path, Manifest::new(chunks.clone()).to_json())
            .expect("write manifest");
        Self {
            dir,
            data,
            chunks,
            blob_path,
            manifest_path,
        }
    }

    /// Rewrite the manifest in the newline-separated format.
    pub fn use_lines_manifest(&self) {
        std::fs::write(&self.manifest_path, lines_manifest(&self.chunks)).expect("write manifest");
    }

    /// Directory holding the fixture files.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Read the manifest back from disk.
    pub async fn manifest(&self) -> Manifest {
        ManifestReader::open(&self.manifest_path)
            .await
            .expect("read manifest")
            .read_all()
            .expect("parse manifest")
    }

    /// A session over the blob file, as the CLI builds it.
    pub async fn session(&self, store: Arc<dyn ChunkStore>, config: SyncConfig) -> SyncSession {
        let blob = FileBlob::open(&self.blob_path).expect("open blob");
        SyncSession::for_file(self.manifest().await, blob, store, config)
    }

    /// Distinct chunk hashes of this fixture.
    pub fn unique_hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self
            .chunks
            .iter()
            .map(|c| c.hash.as_str().to_string())
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes
    }
}

/// Session config with a fixed worker count.
pub fn workers(count: usize) -> SyncConfig {
    SyncConfig {
        workers: Some(count),
        ..SyncConfig::default()
    }
}

/// Overwrite `len` bytes at `offset` with a different pattern.
pub fn corrupt(data: &mut [u8], offset: usize, len: usize) {
    for b in &mut data[offset..offset + len] {
        *b = !*b;
    }
}

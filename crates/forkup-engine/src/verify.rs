//! Read-only verification of a synced blob against the store.
//!
//! Uses the `size` and `get` paths of the [`ChunkStore`]; never writes.

use std::sync::Arc;

use forkup_cas::BlobSource;
use forkup_store::ChunkStore;
use forkup_types::{ChunkHash, ChunkLocation, Namespace};
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::EngineError;
use crate::partition::partition;
use crate::session::{SyncSession, check_blob_length};

/// How thoroughly to verify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Check that every chunk exists with the declared size.
    #[default]
    Size,
    /// Also download every chunk and compare it with the blob bytes.
    Deep,
}

/// What is wrong with a stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProblemKind {
    /// No object under the chunk hash.
    Missing,
    /// The stored object has a different length.
    SizeMismatch {
        /// Length of the stored object.
        stored: u64,
    },
    /// Same length, different bytes.
    ContentMismatch,
}

/// A chunk that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkProblem {
    /// Manifest index.
    pub index: usize,
    /// Chunk hash (store key).
    pub hash: ChunkHash,
    /// The problem found.
    #[serde(flatten)]
    pub kind: ProblemKind,
}

/// Result of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Chunks in the manifest.
    pub total: usize,
    /// Chunks that passed.
    pub verified: usize,
    /// Chunks with no stored object.
    pub missing: usize,
    /// Chunks stored with the wrong length.
    pub size_mismatch: usize,
    /// Chunks whose stored bytes differ from the blob (deep mode only).
    pub content_mismatch: usize,
    /// Every failing chunk, in manifest order.
    pub problems: Vec<ChunkProblem>,
}

impl VerifyReport {
    /// Whether every chunk passed.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.verified == self.total
    }

    fn record(&mut self, chunk: &ChunkLocation, kind: ProblemKind) {
        match kind {
            ProblemKind::Missing => self.missing += 1,
            ProblemKind::SizeMismatch { .. } => self.size_mismatch += 1,
            ProblemKind::ContentMismatch => self.content_mismatch += 1,
        }
        self.problems.push(ChunkProblem {
            index: chunk.index,
            hash: chunk.hash.clone(),
            kind,
        });
    }

    fn merge(&mut self, other: VerifyReport) {
        self.verified += other.verified;
        self.missing += other.missing;
        self.size_mismatch += other.size_mismatch;
        self.content_mismatch += other.content_mismatch;
        self.problems.extend(other.problems);
    }
}

impl SyncSession {
    /// Check that every chunk of the manifest is in the store.
    ///
    /// Store and blob errors other than "not found" end the pass with `Err`.
    pub async fn verify(&self, mode: VerifyMode) -> Result<VerifyReport, EngineError> {
        let namespace = self.namespace();
        let locations: Arc<[ChunkLocation]> = self.manifest().locations().into();
        let span = info_span!("verify", %namespace, chunks = locations.len(), ?mode);
        self.verify_inner(namespace, locations, mode)
            .instrument(span)
            .await
    }

    async fn verify_inner(
        &self,
        namespace: Namespace,
        locations: Arc<[ChunkLocation]>,
        mode: VerifyMode,
    ) -> Result<VerifyReport, EngineError> {
        if mode == VerifyMode::Deep {
            check_blob_length(self.blob().as_ref(), self.manifest(), &locations).await?;
        }

        let ranges = partition(locations.len(), self.workers());
        let mut handles = Vec::with_capacity(ranges.len());
        for (worker, range) in ranges.into_iter().enumerate() {
            let store = self.store().clone();
            let blob = self.blob().clone();
            let namespace = namespace.clone();
            let locations = locations.clone();
            handles.push(tokio::spawn(
                async move {
                    verify_slice(store.as_ref(), blob.as_ref(), &namespace, &locations[range], mode)
                        .await
                }
                .instrument(info_span!("worker", worker)),
            ));
        }

        let mut joined = Vec::with_capacity(handles.len());
        for handle in handles {
            joined.push(handle.await);
        }

        let mut report = VerifyReport {
            total: locations.len(),
            ..VerifyReport::default()
        };
        for result in joined {
            report.merge(result??);
        }

        info!(
            verified = report.verified,
            missing = report.missing,
            size_mismatch = report.size_mismatch,
            content_mismatch = report.content_mismatch,
            "verification finished"
        );
        Ok(report)
    }
}

async fn verify_slice(
    store: &dyn ChunkStore,
    blob: &dyn BlobSource,
    namespace: &Namespace,
    chunks: &[ChunkLocation],
    mode: VerifyMode,
) -> Result<VerifyReport, EngineError> {
    let mut report = VerifyReport::default();

    for chunk in chunks {
        let key = chunk.hash.as_str();
        let stored = match store.size(namespace, key).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                warn!(index = chunk.index, key, "chunk missing from store");
                report.record(chunk, ProblemKind::Missing);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if stored != chunk.size {
            warn!(index = chunk.index, key, stored, expected = chunk.size, "stored chunk has wrong size");
            report.record(chunk, ProblemKind::SizeMismatch { stored });
            continue;
        }

        if mode == VerifyMode::Deep {
            let remote = match store.get(namespace, key).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => {
                    report.record(chunk, ProblemKind::Missing);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let local = blob.read_range(chunk.offset, chunk.size).await?;
            if remote != local {
                warn!(index = chunk.index, key, "stored chunk differs from blob");
                report.record(chunk, ProblemKind::ContentMismatch);
                continue;
            }
        }

        debug!(index = chunk.index, key, "chunk verified");
        report.verified += 1;
    }

    Ok(report)
}

//! [`SyncEngine`]: the per-slice existence-check-then-upload loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use forkup_cas::{BlobSource, verify_chunk};
use forkup_store::ChunkStore;
use forkup_types::{ChunkLocation, DigestAlgorithm, Namespace};
use tracing::{debug, error, warn};

use crate::aggregate::{SliceResult, SyncFailure};

/// Uploads the chunks of a slice that the store does not already hold.
///
/// One engine is shared by every worker of a session. It holds no mutable
/// state of its own apart from the session abort flag; counts are kept
/// locally by each [`sync_slice`](Self::sync_slice) call and returned.
pub struct SyncEngine {
    store: Arc<dyn ChunkStore>,
    blob: Arc<dyn BlobSource>,
    namespace: Namespace,
    verify_digest: Option<DigestAlgorithm>,
    abort: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine writing into `namespace`.
    pub fn new(store: Arc<dyn ChunkStore>, blob: Arc<dyn BlobSource>, namespace: Namespace) -> Self {
        Self {
            store,
            blob,
            namespace,
            verify_digest: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Verify each chunk read from the blob against its manifest hash.
    pub fn with_digest(mut self, algorithm: Option<DigestAlgorithm>) -> Self {
        self.verify_digest = algorithm;
        self
    }

    /// Share an abort flag with other engines of the same session.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Whether a worker has hit a blob error and the session is stopping.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Namespace the engine writes to.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Process `chunks` strictly in order.
    ///
    /// - Present chunks are counted and skipped.
    /// - A failed existence check counts as absent, so the chunk is uploaded.
    /// - A failed `put` stops this slice; other slices carry on.
    /// - A failed blob read or digest check stops this slice and raises the
    ///   session abort flag, which the other workers check before each chunk.
    pub async fn sync_slice(&self, worker: usize, chunks: &[ChunkLocation]) -> SliceResult {
        let mut result = SliceResult::new(worker, chunks.len());
        let namespace = &self.namespace;

        for chunk in chunks {
            if self.is_aborted() {
                debug!(worker, index = chunk.index, "session aborted, stopping slice");
                break;
            }

            let key = chunk.hash.as_str();
            let present = match self.store.exists(namespace, key).await {
                Ok(present) => present,
                Err(e) => {
                    warn!(worker, index = chunk.index, key, error = %e, "existence check failed, uploading anyway");
                    false
                }
            };
            if present {
                debug!(worker, index = chunk.index, key, "chunk already present");
                result.already_existing += 1;
                continue;
            }

            let data = match self.blob.read_range(chunk.offset, chunk.size).await {
                Ok(data) => data,
                Err(e) => {
                    self.abort.store(true, Ordering::Release);
                    error!(worker, index = chunk.index, offset = chunk.offset, error = %e, "blob read failed, aborting session");
                    result.failure = Some(SyncFailure::chunk(worker, chunk.index, &chunk.hash, e));
                    break;
                }
            };

            if let Some(algorithm) = self.verify_digest
                && let Err(e) = verify_chunk(algorithm, chunk, &data)
            {
                self.abort.store(true, Ordering::Release);
                error!(worker, index = chunk.index, key, error = %e, "chunk digest mismatch, aborting session");
                result.failure = Some(SyncFailure::chunk(worker, chunk.index, &chunk.hash, e));
                break;
            }

            match self.store.put(namespace, key, data).await {
                Ok(()) => {
                    debug!(worker, index = chunk.index, key, size = chunk.size, "uploaded chunk");
                    result.uploaded += 1;
                }
                Err(e) => {
                    error!(worker, index = chunk.index, key, error = %e, "upload failed, stopping slice");
                    result.failure = Some(SyncFailure::chunk(worker, chunk.index, &chunk.hash, e));
                    break;
                }
            }
        }

        result
    }
}

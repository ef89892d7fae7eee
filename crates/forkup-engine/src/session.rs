//! [`SyncSession`]: one sync of a blob against a store.
//!
//! A session resolves its namespace, checks the blob length against the
//! manifest, ensures the namespace exists, fans the chunk list out to one
//! tokio task per partition and joins every task before aggregating.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bytes::Bytes;
use forkup_cas::{BlobSource, CasError, FileBlob, Manifest, hex_digest};
use forkup_store::ChunkStore;
use forkup_types::{ChunkLocation, DigestAlgorithm, Namespace};
use tracing::{Instrument, info, info_span, warn};

use crate::aggregate::{ResultAggregator, SyncFailure, SyncReport};
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::partition::{partition, resolve_workers};

/// Object name of the published manifest under the configured prefix.
pub const MANIFEST_OBJECT: &str = "manifest.json";

/// A sync of one blob, described by one manifest, into one store.
pub struct SyncSession {
    manifest: Arc<Manifest>,
    blob: Arc<dyn BlobSource>,
    blob_path: Option<PathBuf>,
    store: Arc<dyn ChunkStore>,
    config: SyncConfig,
}

impl SyncSession {
    /// Create a session over any blob source.
    pub fn new(
        manifest: Manifest,
        blob: Arc<dyn BlobSource>,
        store: Arc<dyn ChunkStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            manifest: Arc::new(manifest),
            blob,
            blob_path: None,
            store,
            config,
        }
    }

    /// Create a session over a file blob, remembering its path for
    /// per-blob namespaces.
    pub fn for_file(
        manifest: Manifest,
        blob: FileBlob,
        store: Arc<dyn ChunkStore>,
        config: SyncConfig,
    ) -> Self {
        let path = blob.path().to_path_buf();
        Self::new(manifest, Arc::new(blob), store, config).with_blob_path(path)
    }

    /// Set the blob path used to derive a per-blob namespace.
    pub fn with_blob_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blob_path = Some(path.into());
        self
    }

    /// The manifest being synced.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The namespace this session reads and writes.
    pub fn namespace(&self) -> Namespace {
        self.config.namespace.resolve(self.blob_path.as_deref())
    }

    pub(crate) fn blob(&self) -> &Arc<dyn BlobSource> {
        &self.blob
    }

    pub(crate) fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub(crate) fn workers(&self) -> usize {
        resolve_workers(self.config.workers)
    }

    /// Run the sync to completion.
    ///
    /// Returns `Err` when the session was aborted: the blob is shorter than
    /// the manifest declares, a chunk could not be read or failed digest
    /// verification, or the namespace could not be created. Store failures
    /// inside workers do not abort; they are reported in
    /// [`SyncReport::error`] after every worker has finished.
    pub async fn run(&self) -> Result<SyncReport, EngineError> {
        let namespace = self.namespace();
        let workers = self.workers();
        let span = info_span!("sync", %namespace, chunks = self.manifest.len(), workers);
        self.run_inner(namespace, workers).instrument(span).await
    }

    async fn run_inner(&self, namespace: Namespace, workers: usize) -> Result<SyncReport, EngineError> {
        let locations: Arc<[ChunkLocation]> = self.manifest.locations().into();
        let total = locations.len();

        check_blob_length(self.blob.as_ref(), &self.manifest, &locations).await?;
        self.store.ensure_namespace(&namespace).await?;

        let ranges = partition(total, workers);
        info!(
            total,
            bytes = self.manifest.total_size(),
            workers = ranges.len(),
            per_worker = ranges.first().map_or(0, |r| r.len()),
            "starting sync"
        );

        let abort = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(
            SyncEngine::new(self.store.clone(), self.blob.clone(), namespace.clone())
                .with_digest(self.config.verify_digest)
                .with_abort_flag(abort),
        );

        let mut handles = Vec::with_capacity(ranges.len());
        for (worker, range) in ranges.into_iter().enumerate() {
            let engine = engine.clone();
            let locations = locations.clone();
            let span = info_span!("worker", worker, start = range.start, end = range.end);
            handles.push(tokio::spawn(
                async move { engine.sync_slice(worker, &locations[range]).await }.instrument(span),
            ));
        }

        // Join every worker before looking at any result.
        let mut joined = Vec::with_capacity(handles.len());
        for handle in handles {
            joined.push(handle.await);
        }

        let mut aggregator = ResultAggregator::new(total);
        for result in joined {
            aggregator.record(result?);
        }
        let mut report = aggregator.finish()?;

        if report.error.is_none()
            && let Some(prefix) = &self.config.manifest_prefix
        {
            match self.publish_manifest(&namespace, prefix).await {
                Ok(keys) => report.manifest_keys = keys,
                Err((key, e)) => {
                    warn!(key = %key, error = %e, "manifest publication failed");
                    report.error = Some(SyncFailure {
                        worker: None,
                        chunk: None,
                        key,
                        error: e.into(),
                    });
                }
            }
        }

        info!(
            uploaded = report.uploaded,
            already_existing = report.already_existing,
            unsynced = report.unsynced(),
            "sync finished"
        );
        Ok(report)
    }

    /// Store the canonical manifest JSON under `<prefix>/manifest.json` and
    /// under `<prefix>/<sha256 of the JSON>`.
    async fn publish_manifest(
        &self,
        namespace: &Namespace,
        prefix: &str,
    ) -> Result<Vec<String>, (String, forkup_store::StoreError)> {
        let json = self.manifest.to_json();
        let digest = hex_digest(DigestAlgorithm::Sha256, json.as_bytes());
        let keys = manifest_keys(prefix, &digest);
        let body = Bytes::from(json);

        for key in &keys {
            self.store
                .put(namespace, key, body.clone())
                .await
                .map_err(|e| (key.clone(), e))?;
        }
        info!(keys = ?keys, "published manifest");
        Ok(keys)
    }
}

/// Keys a manifest with the given digest is published under.
pub fn manifest_keys(prefix: &str, digest: &str) -> Vec<String> {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        vec![MANIFEST_OBJECT.to_string(), digest.to_string()]
    } else {
        vec![
            format!("{prefix}/{MANIFEST_OBJECT}"),
            format!("{prefix}/{digest}"),
        ]
    }
}

/// Compare the blob length with the manifest before touching the store.
///
/// A short blob fails with the [`CasError::ShortRead`] of the first chunk
/// that runs past its end. Trailing bytes not covered by the manifest are
/// only logged.
pub(crate) async fn check_blob_length(
    blob: &dyn BlobSource,
    manifest: &Manifest,
    locations: &[ChunkLocation],
) -> Result<(), EngineError> {
    let declared = manifest.total_size();
    let actual = blob.length().await?;

    if actual < declared {
        if let Some(chunk) = locations.iter().find(|c| c.end() > actual) {
            return Err(CasError::ShortRead {
                offset: chunk.offset,
                expected: chunk.size,
                actual: actual.saturating_sub(chunk.offset),
            }
            .into());
        }
    } else if actual > declared {
        warn!(
            declared,
            actual,
            uncovered = actual - declared,
            "blob is longer than the manifest, trailing bytes will not be synced"
        );
    }
    Ok(())
}


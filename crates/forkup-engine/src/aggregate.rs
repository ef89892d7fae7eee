//! Merging per-worker results into the session report.

use std::fmt;

use forkup_types::ChunkHash;

use crate::error::EngineError;

/// The error that stopped a worker, with the chunk it was working on.
#[derive(Debug)]
pub struct SyncFailure {
    /// Worker index, or `None` for the manifest publication step.
    pub worker: Option<usize>,
    /// Manifest index of the failing chunk, if the failure concerns a chunk.
    pub chunk: Option<usize>,
    /// Store key being processed.
    pub key: String,
    /// Underlying error.
    pub error: EngineError,
}

impl SyncFailure {
    /// A failure on one chunk of a worker's slice.
    pub fn chunk(worker: usize, index: usize, hash: &ChunkHash, error: impl Into<EngineError>) -> Self {
        Self {
            worker: Some(worker),
            chunk: Some(index),
            key: hash.to_string(),
            error: error.into(),
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.worker, self.chunk) {
            (Some(worker), Some(chunk)) => {
                write!(f, "worker {worker}, chunk {chunk} ({}): {}", self.key, self.error)
            }
            _ => write!(f, "{}: {}", self.key, self.error),
        }
    }
}

/// What one worker did with its slice.
#[derive(Debug)]
pub struct SliceResult {
    /// Worker index (position of the slice in the partition).
    pub worker: usize,
    /// Chunks assigned to the worker.
    pub assigned: usize,
    /// Chunks uploaded.
    pub uploaded: usize,
    /// Chunks found already present.
    pub already_existing: usize,
    /// The error that stopped the slice early, if any.
    pub failure: Option<SyncFailure>,
}

impl SliceResult {
    /// An empty result for `worker` with `assigned` chunks.
    pub fn new(worker: usize, assigned: usize) -> Self {
        Self {
            worker,
            assigned,
            uploaded: 0,
            already_existing: 0,
            failure: None,
        }
    }

    /// Chunks the worker finished, either way.
    pub fn processed(&self) -> usize {
        self.uploaded + self.already_existing
    }
}

/// Final state of a sync, when it was not aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every chunk is in the store.
    Synced,
    /// Some worker failed; `unsynced` chunks were not confirmed stored.
    Partial {
        /// Chunks neither uploaded nor found present.
        unsynced: usize,
    },
}

/// Result of a sync session.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Chunks in the manifest.
    pub total: usize,
    /// Chunks uploaded by this session.
    pub uploaded: usize,
    /// Chunks already present in the store.
    pub already_existing: usize,
    /// First failure in worker order.
    pub error: Option<SyncFailure>,
    /// Keys the manifest was published under.
    pub manifest_keys: Vec<String>,
}

impl SyncReport {
    /// Chunks not confirmed stored.
    pub fn unsynced(&self) -> usize {
        self.total
            .saturating_sub(self.uploaded + self.already_existing)
    }

    /// Whether the sync completed or only partly succeeded.
    pub fn outcome(&self) -> SyncOutcome {
        if self.error.is_none() && self.unsynced() == 0 {
            SyncOutcome::Synced
        } else {
            SyncOutcome::Partial {
                unsynced: self.unsynced(),
            }
        }
    }

    /// Shorthand for `outcome() == SyncOutcome::Synced`.
    pub fn is_synced(&self) -> bool {
        self.outcome() == SyncOutcome::Synced
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} uploaded={} already_existing={}",
            self.total, self.uploaded, self.already_existing
        )?;
        match self.outcome() {
            SyncOutcome::Synced => write!(f, " status=synced")?,
            SyncOutcome::Partial { unsynced } => {
                write!(f, " status=partial unsynced={unsynced}")?
            }
        }
        if let Some(failure) = &self.error {
            write!(f, " error=\"{failure}\"")?;
        }
        Ok(())
    }
}

/// Collects [`SliceResult`]s from every worker and builds the [`SyncReport`].
///
/// Results may arrive in any order; they are merged in worker-index order so
/// the reported error is deterministic.
#[derive(Debug)]
pub struct ResultAggregator {
    total: usize,
    slices: Vec<SliceResult>,
}

impl ResultAggregator {
    /// Start aggregating a session over `total` chunks.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            slices: Vec::new(),
        }
    }

    /// Record one worker's result.
    pub fn record(&mut self, result: SliceResult) {
        self.slices.push(result);
    }

    /// Merge all recorded results.
    ///
    /// If any worker was stopped by a session-aborting error (the blob does
    /// not match the manifest), that error is returned instead of a report.
    /// Otherwise the report carries the first store failure in worker order.
    pub fn finish(mut self) -> Result<SyncReport, EngineError> {
        self.slices.sort_by_key(|s| s.worker);

        let mut report = SyncReport {
            total: self.total,
            ..SyncReport::default()
        };
        let mut aborted = None;

        for slice in self.slices {
            report.uploaded += slice.uploaded;
            report.already_existing += slice.already_existing;
            if let Some(failure) = slice.failure {
                if failure.error.aborts_session() {
                    aborted.get_or_insert(failure.error);
                } else if report.error.is_none() {
                    report.error = Some(failure);
                }
            }
        }

        match aborted {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }
}

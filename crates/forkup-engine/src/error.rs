//! Error types for the engine.

/// Errors that can occur during a sync or verify session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Manifest or blob error: parse failures, short reads, digest mismatches.
    #[error("cas error: {0}")]
    Cas(#[from] forkup_cas::CasError),

    /// Failed to access the chunk store.
    #[error("store error: {0}")]
    Store(#[from] forkup_store::StoreError),

    /// A worker task panicked or was cancelled by the runtime.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Whether this error means the manifest does not describe the blob.
    ///
    /// Such errors abort the whole session rather than a single slice.
    pub fn aborts_session(&self) -> bool {
        matches!(self, Self::Cas(_) | Self::Join(_))
    }
}

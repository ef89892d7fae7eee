//! Error types for chunk store operations.

use forkup_types::Namespace;

/// Errors that can occur during chunk store operations.
///
/// "Object absent" is not an error for [`exists`](crate::ChunkStore::exists),
/// which returns `Ok(false)`. `NotFound` is only raised by `get` and `size`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {namespace}/{key}")]
    NotFound {
        /// Namespace searched.
        namespace: Namespace,
        /// Object key.
        key: String,
    },

    /// The namespace (bucket) does not exist.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(Namespace),

    /// The key cannot be mapped onto this backend.
    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    /// The store has reached its capacity limit.
    #[error("store capacity exceeded: need {needed} bytes, only {available} available")]
    CapacityExceeded {
        /// Bytes needed for the operation.
        needed: u64,
        /// Bytes currently available.
        available: u64,
    },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote backend rejected or failed the request (network, auth, 5xx).
    #[error("{operation} failed: {message}")]
    Backend {
        /// Backend operation name, e.g. `put_object`.
        operation: &'static str,
        /// Error description from the backend client.
        message: String,
    },

    /// A failure injected by [`FaultyStore`](crate::FaultyStore).
    #[error("injected failure: {0}")]
    Injected(String),

    /// A transient error persisted through every retry.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Store operation name.
        operation: &'static str,
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend { .. })
    }

    /// Whether this is a missing-object error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

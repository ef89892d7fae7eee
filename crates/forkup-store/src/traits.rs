//! Core trait for chunk storage.

use bytes::Bytes;
use forkup_types::Namespace;

use crate::error::StoreError;

/// Content-addressable storage for chunks, keyed by hash within a namespace.
///
/// All implementations must be `Send + Sync`: a sync session shares one store
/// between all of its workers. Puts are idempotent; storing the same key twice
/// leaves one object.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Create the namespace if it does not exist. Idempotent.
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError>;

    /// Check whether an object exists. Absence is `Ok(false)`, not an error.
    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError>;

    /// Store an object, replacing any previous value.
    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Fetch an object's bytes.
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError>;

    /// Fetch an object's length in bytes.
    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError>;
}

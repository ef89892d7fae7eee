//! Session configuration.

use std::path::Path;

use forkup_types::{DigestAlgorithm, Namespace};

/// Where a session stores its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespacePolicy {
    /// One shared namespace: identical chunks of different blobs are stored once.
    Global(Namespace),
    /// A namespace derived from the blob's file name; dedup stays within one blob.
    PerBlob,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self::Global(Namespace::default())
    }
}

impl NamespacePolicy {
    /// Resolve the namespace for a blob. Blobs without a path use `blob`.
    pub fn resolve(&self, blob_path: Option<&Path>) -> Namespace {
        match self {
            Self::Global(namespace) => namespace.clone(),
            Self::PerBlob => Namespace::for_blob(blob_path.unwrap_or(Path::new("blob"))),
        }
    }
}

/// Settings for one [`SyncSession`](crate::SyncSession).
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Number of workers; `None` uses the available hardware parallelism.
    pub workers: Option<usize>,
    /// Namespace selection.
    pub namespace: NamespacePolicy,
    /// Hash every chunk read from the blob and compare it with the manifest.
    pub verify_digest: Option<DigestAlgorithm>,
    /// Publish the manifest under this key prefix after a complete sync.
    pub manifest_prefix: Option<String>,
}

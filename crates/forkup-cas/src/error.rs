//! Error types for manifest and blob operations.

use forkup_types::ChunkHash;

/// Why a manifest entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseReason {
    /// No `:` between size and hash.
    #[error("missing ':' delimiter")]
    MissingDelimiter,

    /// Size segment is not a non-negative decimal integer.
    #[error("size is not a non-negative decimal integer")]
    InvalidSize,

    /// Size segment is zero.
    #[error("size must be greater than zero")]
    ZeroSize,

    /// Hash segment is empty.
    #[error("hash is empty")]
    EmptyHash,

    /// Hash segment is not a hex digest.
    #[error("hash is not a hex digest: {0}")]
    InvalidHash(forkup_types::HashError),

    /// A JSON array element is not a string.
    #[error("entry is not a string")]
    NotAString,
}

/// Errors that can occur while reading manifests and blobs.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// A manifest entry is malformed.
    #[error("malformed manifest entry {index} ({entry:?}): {reason}")]
    Parse {
        /// Zero-based position of the entry in the manifest.
        index: usize,
        /// The raw entry text.
        entry: String,
        /// What is wrong with it.
        reason: ParseReason,
    },

    /// The manifest document itself is unreadable (bad JSON, not an array).
    #[error("malformed manifest: {0}")]
    InvalidManifest(String),

    /// Fewer bytes were available at `offset` than the manifest declares.
    #[error("short read at offset {offset}: wanted {expected} bytes, blob has {actual}")]
    ShortRead {
        /// Chunk offset within the blob.
        offset: u64,
        /// Declared chunk size.
        expected: u64,
        /// Bytes actually available from `offset`.
        actual: u64,
    },

    /// Chunk bytes do not hash to the manifest hash.
    #[error("hash mismatch at offset {offset}: manifest says {expected}, data hashes to {actual}")]
    HashMismatch {
        /// Chunk offset within the blob.
        offset: u64,
        /// Hash from the manifest.
        expected: ChunkHash,
        /// Hex digest of the bytes read.
        actual: String,
    },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CasError {
    /// True for manifest format errors (rejected before any chunk is touched).
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::InvalidManifest(_))
    }

    /// True when the blob contradicts the manifest.
    pub fn is_blob_mismatch(&self) -> bool {
        matches!(self, Self::ShortRead { .. } | Self::HashMismatch { .. })
    }
}

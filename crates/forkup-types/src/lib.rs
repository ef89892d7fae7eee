//! Shared types and identifiers for forkup.
//!
//! This crate defines the vocabulary used across the workspace:
//! identifiers ([`ChunkHash`], [`Namespace`]), manifest data
//! ([`ChunkDescriptor`], [`ChunkLocation`]) and the digest selector
//! ([`DigestAlgorithm`]).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk identifiers
// ---------------------------------------------------------------------------

/// Reasons a string is rejected as a [`ChunkHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// The hash segment is empty.
    #[error("hash is empty")]
    Empty,

    /// The hash contains a character that is not a hex digit.
    #[error("hash contains non-hex character {0:?}")]
    NotHex(char),
}

/// Content hash of a chunk, as written in the manifest: a hex digest string.
///
/// The hash doubles as the object key in the chunk store. The original
/// spelling is preserved so keys round-trip exactly; comparisons against
/// computed digests are case-insensitive.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkHash(String);

impl ChunkHash {
    /// Validate and wrap a hex digest string.
    pub fn new(hex: impl Into<String>) -> Result<Self, HashError> {
        let hex = hex.into();
        if hex.is_empty() {
            return Err(HashError::Empty);
        }
        if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(HashError::NotHex(c));
        }
        Ok(Self(hex))
    }

    /// The hash as a string slice (the store key).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `digest` (raw bytes) encodes to this hash, ignoring case.
    pub fn matches_digest(&self, digest: &[u8]) -> bool {
        if self.0.len() != digest.len() * 2 {
            return false;
        }
        digest
            .iter()
            .zip(self.0.as_bytes().chunks(2))
            .all(|(byte, pair)| {
                let hi = nibble(pair[0]);
                let lo = nibble(pair[1]);
                hi.zip(lo).is_some_and(|(hi, lo)| ((hi << 4) | lo) == *byte)
            })
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl TryFrom<String> for ChunkHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChunkHash> for String {
    fn from(hash: ChunkHash) -> Self {
        hash.0
    }
}

impl FromStr for ChunkHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ChunkHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Manifest data
// ---------------------------------------------------------------------------

/// One manifest entry: `"<size>:<hash>"`.
///
/// The descriptor carries no offset; its position in the blob is the running
/// sum of the sizes before it (see [`ChunkLocation`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Chunk length in bytes, always > 0.
    pub size: u64,
    /// Content hash, used as the store key.
    pub hash: ChunkHash,
}

impl ChunkDescriptor {
    /// Render the descriptor back into its manifest token form.
    pub fn to_token(&self) -> String {
        format!("{}:{}", self.size, self.hash)
    }
}

/// A descriptor resolved to its byte range within the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Position of the descriptor in the manifest.
    pub index: usize,
    /// Byte offset of the chunk within the blob.
    pub offset: u64,
    /// Chunk length in bytes.
    pub size: u64,
    /// Content hash of the chunk.
    pub hash: ChunkHash,
}

impl ChunkLocation {
    /// Exclusive end offset of the chunk.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

/// Reasons a string is rejected as a [`Namespace`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
    /// Length outside 3..=63.
    #[error("namespace {0:?} must be 3 to 63 characters long")]
    Length(String),

    /// Contains characters outside `[a-z0-9.-]`.
    #[error("namespace {0:?} may only contain lowercase letters, digits, '.' and '-'")]
    Charset(String),

    /// Does not start and end with a letter or digit.
    #[error("namespace {0:?} must start and end with a letter or digit")]
    Boundary(String),
}

/// A key space ("bucket") in the chunk store. Dedup is scoped to a namespace.
///
/// Names follow S3 bucket naming rules so the same value works against every
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

/// Namespace used when dedup spans every synced blob.
pub const DEFAULT_NAMESPACE: &str = "forkup-chunks";

impl Namespace {
    /// Validate a bucket name.
    pub fn new(name: impl Into<String>) -> Result<Self, NamespaceError> {
        let name = name.into();
        if !(3..=63).contains(&name.len()) {
            return Err(NamespaceError::Length(name));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
        {
            return Err(NamespaceError::Charset(name));
        }
        let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        let bytes = name.as_bytes();
        if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
            return Err(NamespaceError::Boundary(name));
        }
        Ok(Self(name))
    }

    /// Derive a namespace from a blob's file name, for per-blob dedup scoping.
    ///
    /// Lower-cases the name, replaces anything outside `[a-z0-9.-]` with `-`,
    /// trims non-alphanumeric edges and pads or truncates to a legal length.
    pub fn for_blob(path: &Path) -> Self {
        let raw = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut name: String = raw
            .to_ascii_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        name.truncate(63);
        let name = name.trim_matches(|c: char| !c.is_ascii_alphanumeric());

        let mut name = name.to_string();
        if name.is_empty() {
            name.push_str("blob");
        }
        while name.len() < 3 {
            name.push('0');
        }
        Self(name)
    }

    /// The bucket name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl FromStr for Namespace {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Digests
// ---------------------------------------------------------------------------

/// Digest used to verify chunk bytes against manifest hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, the digest the manifest tooling emits.
    #[default]
    Sha256,
    /// BLAKE3.
    Blake3,
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unknown digest algorithm {other:?}")),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Blake3 => f.write_str("blake3"),
        }
    }
}

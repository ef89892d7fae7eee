//! Manifest reading.
//!
//! A manifest is an ordered list of `"<decimal-size>:<hex-hash>"` tokens,
//! either one per line or as a JSON array of strings. Offsets are not stored:
//! a chunk starts where the previous one ended.
//!
//! Parsing is all-or-nothing. [`ManifestReader::read_all`] either returns a
//! complete [`Manifest`] or the first malformed entry; callers never see a
//! partial manifest.

use std::collections::HashSet;
use std::path::Path;

use forkup_types::{ChunkDescriptor, ChunkHash, ChunkLocation, HashError};
use tracing::debug;

use crate::error::{CasError, ParseReason};

/// On-disk manifest encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// One token per line; blank lines are ignored.
    Lines,
    /// A JSON array of token strings.
    Json,
}

impl ManifestFormat {
    /// Guess the format from the first non-whitespace character.
    pub fn detect(source: &str) -> Self {
        if source.trim_start().starts_with('[') {
            Self::Json
        } else {
            Self::Lines
        }
    }
}

/// Reads chunk descriptors from a manifest source.
///
/// [`entries`](Self::entries) is lazy and restartable: every call walks the
/// source from the start and parses one token per step.
pub struct ManifestReader {
    format: ManifestFormat,
    source: String,
    /// JSON elements, split once up front. Unused for line manifests.
    elements: Vec<serde_json::Value>,
}

impl ManifestReader {
    /// Wrap manifest text, detecting its format.
    pub fn new(source: impl Into<String>) -> Result<Self, CasError> {
        let source = source.into();
        let format = ManifestFormat::detect(&source);
        let elements = match format {
            ManifestFormat::Lines => Vec::new(),
            ManifestFormat::Json => {
                let value: serde_json::Value = serde_json::from_str(&source)
                    .map_err(|e| CasError::InvalidManifest(format!("invalid JSON: {e}")))?;
                match value {
                    serde_json::Value::Array(items) => items,
                    _ => {
                        return Err(CasError::InvalidManifest(
                            "JSON manifest is not an array".to_string(),
                        ));
                    }
                }
            }
        };
        Ok(Self {
            format,
            source,
            elements,
        })
    }

    /// Read a manifest file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CasError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), bytes = source.len(), "read manifest");
        Self::new(source)
    }

    /// Detected format.
    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    /// Iterate over entries in file order, parsing each on demand.
    pub fn entries(&self) -> Box<dyn Iterator<Item = Result<ChunkDescriptor, CasError>> + '_> {
        match self.format {
            ManifestFormat::Lines => Box::new(
                self.source
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .enumerate()
                    .map(|(index, token)| parse_entry(index, token)),
            ),
            ManifestFormat::Json => {
                Box::new(
                    self.elements
                        .iter()
                        .enumerate()
                        .map(|(index, value)| match value.as_str() {
                            Some(token) => parse_entry(index, token),
                            None => Err(CasError::Parse {
                                index,
                                entry: value.to_string(),
                                reason: ParseReason::NotAString,
                            }),
                        }),
                )
            }
        }
    }

    /// Parse every entry, failing on the first malformed one.
    pub fn read_all(&self) -> Result<Manifest, CasError> {
        let chunks = self.entries().collect::<Result<Vec<_>, _>>()?;
        debug!(chunks = chunks.len(), format = ?self.format, "parsed manifest");
        Ok(Manifest::new(chunks))
    }
}

/// Parse a single `"<size>:<hash>"` token.
pub fn parse_entry(index: usize, token: &str) -> Result<ChunkDescriptor, CasError> {
    let fail = |reason| CasError::Parse {
        index,
        entry: token.to_string(),
        reason,
    };

    let (size, hash) = token
        .trim()
        .split_once(':')
        .ok_or_else(|| fail(ParseReason::MissingDelimiter))?;

    let size: u64 = size
        .trim()
        .parse()
        .map_err(|_| fail(ParseReason::InvalidSize))?;
    if size == 0 {
        return Err(fail(ParseReason::ZeroSize));
    }

    let hash = ChunkHash::new(hash.trim()).map_err(|e| match e {
        HashError::Empty => fail(ParseReason::EmptyHash),
        other => fail(ParseReason::InvalidHash(other)),
    })?;

    Ok(ChunkDescriptor { size, hash })
}

/// Summary numbers for a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestStats {
    /// Number of entries.
    pub chunks: usize,
    /// Distinct hashes among the entries.
    pub unique_chunks: usize,
    /// Sum of all chunk sizes (the expected blob length).
    pub total_size: u64,
    /// Sum of sizes counting each distinct hash once.
    pub unique_size: u64,
}

/// A parsed manifest: the ordered chunk list of one blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    chunks: Vec<ChunkDescriptor>,
}

impl Manifest {
    /// Build a manifest from descriptors already in blob order.
    pub fn new(chunks: Vec<ChunkDescriptor>) -> Self {
        Self { chunks }
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the manifest has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Descriptors in blob order.
    pub fn descriptors(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Iterate over chunks with their derived offsets.
    pub fn iter(&self) -> impl Iterator<Item = ChunkLocation> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .scan(0u64, |offset, (index, chunk)| {
                let location = ChunkLocation {
                    index,
                    offset: *offset,
                    size: chunk.size,
                    hash: chunk.hash.clone(),
                };
                *offset = offset.saturating_add(chunk.size);
                Some(location)
            })
    }

    /// All chunk locations, materialized for sharing across workers.
    pub fn locations(&self) -> Vec<ChunkLocation> {
        self.iter().collect()
    }

    /// Sum of declared chunk sizes; must equal the blob length.
    pub fn total_size(&self) -> u64 {
        self.chunks
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.size))
    }

    /// Count chunks and measure how much of the manifest is repeated content.
    pub fn stats(&self) -> ManifestStats {
        let mut seen = HashSet::new();
        let mut unique_size = 0u64;
        for chunk in &self.chunks {
            if seen.insert(&chunk.hash) {
                unique_size = unique_size.saturating_add(chunk.size);
            }
        }
        ManifestStats {
            chunks: self.chunks.len(),
            unique_chunks: seen.len(),
            total_size: self.total_size(),
            unique_size,
        }
    }

    /// Canonical JSON array rendering, as published next to the chunks.
    pub fn to_json(&self) -> String {
        let tokens: Vec<String> = self.chunks.iter().map(ChunkDescriptor::to_token).collect();
        serde_json::Value::from(tokens).to_string()
    }
}

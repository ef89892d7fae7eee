//! Content addressing inputs: manifests, blobs and chunk digests.
//!
//! This crate provides:
//! - [`ManifestReader`]: parses `"<size>:<hash>"` entries into a [`Manifest`].
//! - [`BlobSource`]: positional byte-range reads over the local blob, with
//!   [`FileBlob`] and [`MemoryBlob`] implementations.
//! - [`verify_chunk`]: re-hashes chunk bytes against the manifest hash.

mod blob;
mod digest;
mod error;
mod manifest;

pub use blob::{BlobSource, FileBlob, MemoryBlob};
pub use digest::{digest, hex_digest, verify_chunk};
pub use error::{CasError, ParseReason};
pub use manifest::{Manifest, ManifestFormat, ManifestReader, ManifestStats, parse_entry};

//! Deduplicating chunk synchronization.
//!
//! A [`SyncSession`] takes a parsed manifest, a blob and a chunk store and
//! uploads every chunk whose hash is not already present. The chunk list is
//! split into contiguous slices by [`partition`], each slice is processed in
//! manifest order by a [`SyncEngine`] worker, and the per-worker results are
//! merged by the [`ResultAggregator`] into a [`SyncReport`].

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod partition;
pub mod session;
pub mod verify;

pub use aggregate::{ResultAggregator, SliceResult, SyncFailure, SyncOutcome, SyncReport};
pub use config::{NamespacePolicy, SyncConfig};
pub use engine::SyncEngine;
pub use error::EngineError;
pub use partition::{partition, resolve_workers};
pub use session::SyncSession;
pub use verify::{ChunkProblem, ProblemKind, VerifyMode, VerifyReport};

#[cfg(test)]
mod tests;

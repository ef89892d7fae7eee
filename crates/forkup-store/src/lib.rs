//! Chunk store trait and backend implementations.
//!
//! This crate defines the [`ChunkStore`] trait for content-addressed chunk
//! storage keyed by hash within a [`Namespace`](forkup_types::Namespace), along
//! with its backends:
//!
//! - [`S3Store`]: any S3-compatible object store (MinIO, AWS S3).
//! - [`FileStore`]: a local directory with a fan-out layout.
//! - [`MemoryStore`]: in-memory storage with operation counters, for tests.
//!
//! and wrappers that layer behaviour onto any store:
//!
//! - [`RetryStore`]: bounded exponential backoff for transient errors.
//! - [`SlowStore`]: seeded random latency.
//! - [`FaultyStore`]: injected failures.

mod error;
mod faulty_store;
mod file_store;
mod memory_store;
mod retry_store;
mod s3_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use faulty_store::FaultyStore;
pub use file_store::FileStore;
pub use memory_store::{MemoryStore, StoreOps};
pub use retry_store::{RetryPolicy, RetryStore};
pub use s3_store::{S3Config, S3Store};
pub use slow_store::SlowStore;
pub use traits::ChunkStore;

//! A [`ChunkStore`] wrapper that adds configurable random IO latency.
//!
//! `SlowStore` wraps any `Arc<dyn ChunkStore>` and sleeps for a random
//! duration before each operation. The RNG is seeded, so a given seed always
//! produces the same sequence of delays.
//!
//! # Example
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(1, 5)     // exists/get/size
//!     .write_latency(5, 20)   // put/ensure_namespace
//!     .seed(42);
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use forkup_types::Namespace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// A [`ChunkStore`] wrapper that injects random latency before IO operations.
///
/// Surfaces ordering bugs between workers that an instant in-memory store
/// would hide.
pub struct SlowStore {
    inner: Arc<dyn ChunkStore>,
    read_latency_ms: (u64, u64),
    write_latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn ChunkStore>) -> Self {
        Self {
            inner,
            read_latency_ms: (0, 0),
            write_latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Set the read latency range in milliseconds (uniform random).
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.read_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the write latency range in milliseconds (uniform random).
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Sleep for a random duration in `[min, max]` milliseconds.
    async fn delay(&self, range: (u64, u64)) {
        let (min, max) = range;
        if max == 0 {
            return;
        }

        let ms = if min >= max {
            max
        } else {
            self.rng
                .lock()
                .expect("lock poisoned")
                .random_range(min..=max)
        };

        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl ChunkStore for SlowStore {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.ensure_namespace(namespace).await
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.exists(namespace, key).await
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.put(namespace, key, data).await
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.get(namespace, key).await
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.size(namespace, key).await
    }
}

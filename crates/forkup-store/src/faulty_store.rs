//! A [`ChunkStore`] wrapper that injects failures.
//!
//! Failures are configured up front and checked before the call reaches the
//! wrapped store, so a failed `put` never writes anything.
//!
//! # Example
//!
//! ```ignore
//! let faulty = FaultyStore::new(inner)
//!     .fail_puts_for(["bbbb"])   // permanent put failure for one key
//!     .transient_failures(2);    // first two calls fail with a retryable error
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use forkup_types::Namespace;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// A [`ChunkStore`] wrapper with configurable failure injection.
pub struct FaultyStore {
    inner: Arc<dyn ChunkStore>,
    failing_puts: HashSet<String>,
    failing_exists: HashSet<String>,
    fail_all_exists: bool,
    fail_ensure_namespace: bool,
    transient_remaining: AtomicU32,
}

impl FaultyStore {
    /// Wrap an existing store with no failures configured.
    pub fn new(inner: Arc<dyn ChunkStore>) -> Self {
        Self {
            inner,
            failing_puts: HashSet::new(),
            failing_exists: HashSet::new(),
            fail_all_exists: false,
            fail_ensure_namespace: false,
            transient_remaining: AtomicU32::new(0),
        }
    }

    /// Make every `put` of these keys fail permanently.
    pub fn fail_puts_for<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_puts.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Make every `exists` of these keys fail permanently.
    pub fn fail_exists_for<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_exists.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Make every `exists` call fail permanently.
    pub fn fail_all_exists(mut self) -> Self {
        self.fail_all_exists = true;
        self
    }

    /// Make `ensure_namespace` fail permanently.
    pub fn fail_ensure_namespace(mut self) -> Self {
        self.fail_ensure_namespace = true;
        self
    }

    /// Fail the next `count` calls of any operation with a transient error.
    pub fn transient_failures(self, count: u32) -> Self {
        self.transient_remaining.store(count, Ordering::SeqCst);
        self
    }

    fn take_transient(&self, operation: &'static str) -> Result<(), StoreError> {
        let took = self
            .transient_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            debug!(operation, "injecting transient failure");
            return Err(StoreError::Backend {
                operation,
                message: "injected transient failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChunkStore for FaultyStore {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        self.take_transient("ensure_namespace")?;
        if self.fail_ensure_namespace {
            return Err(StoreError::Injected(format!("ensure_namespace {namespace}")));
        }
        self.inner.ensure_namespace(namespace).await
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        self.take_transient("exists")?;
        if self.fail_all_exists || self.failing_exists.contains(key) {
            return Err(StoreError::Injected(format!("exists {namespace}/{key}")));
        }
        self.inner.exists(namespace, key).await
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.take_transient("put")?;
        if self.failing_puts.contains(key) {
            return Err(StoreError::Injected(format!("put {namespace}/{key}")));
        }
        self.inner.put(namespace, key, data).await
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        self.take_transient("get")?;
        self.inner.get(namespace, key).await
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        self.take_transient("size")?;
        self.inner.size(namespace, key).await
    }
}

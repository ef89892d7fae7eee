//! A [`ChunkStore`] wrapper that retries transient failures.
//!
//! Only errors for which [`StoreError::is_transient`] holds are retried;
//! everything else is returned immediately. Delays grow exponentially from
//! `initial_delay` up to `max_delay`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use forkup_types::Namespace;
use tracing::warn;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// How many times, and how patiently, to retry a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Retries transient errors of the wrapped store according to a [`RetryPolicy`].
pub struct RetryStore {
    inner: Arc<dyn ChunkStore>,
    policy: RetryPolicy,
}

impl RetryStore {
    /// Wrap `inner` with the given policy.
    pub fn new(inner: Arc<dyn ChunkStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt > self.policy.max_retries => {
                    if self.policy.max_retries == 0 {
                        return Err(e);
                    }
                    return Err(StoreError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(operation, key, attempt, ?delay, error = %e, "transient store error, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ChunkStore for RetryStore {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.execute_with_retry("ensure_namespace", "", move || {
            inner.ensure_namespace(namespace)
        })
        .await
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        let inner = &self.inner;
        self.execute_with_retry("exists", key, move || inner.exists(namespace, key))
            .await
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.execute_with_retry("put", key, move || {
            inner.put(namespace, key, data.clone())
        })
        .await
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        let inner = &self.inner;
        self.execute_with_retry("get", key, move || inner.get(namespace, key))
            .await
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        let inner = &self.inner;
        self.execute_with_retry("size", key, move || inner.size(namespace, key))
            .await
    }
}

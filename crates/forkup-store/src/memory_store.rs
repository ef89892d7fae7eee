//! In-memory chunk storage backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use forkup_types::Namespace;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// Snapshot of how many times each store operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOps {
    /// `ensure_namespace` calls.
    pub ensure_namespace: u64,
    /// `exists` calls.
    pub exists: u64,
    /// `put` calls.
    pub put: u64,
    /// `get` calls.
    pub get: u64,
    /// `size` calls.
    pub size: u64,
}

impl StoreOps {
    /// Total calls across all operations.
    pub fn total(&self) -> u64 {
        self.ensure_namespace + self.exists + self.put + self.get + self.size
    }
}

#[derive(Default)]
struct OpCounters {
    ensure_namespace: AtomicU64,
    exists: AtomicU64,
    put: AtomicU64,
    get: AtomicU64,
    size: AtomicU64,
}

type Objects = HashMap<String, Bytes>;

/// In-memory chunk store backed by a `RwLock<HashMap>` per namespace.
///
/// Like a real bucket store, operations on a namespace that was never
/// ensured fail with [`StoreError::NamespaceNotFound`]. Tracks total bytes
/// stored against a configurable maximum, and counts every call so tests can
/// assert on the exact store interactions of a session.
pub struct MemoryStore {
    namespaces: RwLock<HashMap<Namespace, Objects>>,
    max_bytes: u64,
    ops: OpCounters,
}

impl MemoryStore {
    /// Create a new in-memory store with the given capacity limit.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            max_bytes,
            ops: OpCounters::default(),
        }
    }

    /// Create a store with no practical capacity limit.
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// Operation counts since creation or the last [`reset_ops`](Self::reset_ops).
    pub fn ops(&self) -> StoreOps {
        StoreOps {
            ensure_namespace: self.ops.ensure_namespace.load(Ordering::Relaxed),
            exists: self.ops.exists.load(Ordering::Relaxed),
            put: self.ops.put.load(Ordering::Relaxed),
            get: self.ops.get.load(Ordering::Relaxed),
            size: self.ops.size.load(Ordering::Relaxed),
        }
    }

    /// Zero all operation counters.
    pub fn reset_ops(&self) {
        for counter in [
            &self.ops.ensure_namespace,
            &self.ops.exists,
            &self.ops.put,
            &self.ops.get,
            &self.ops.size,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Whether the namespace has been created.
    pub fn has_namespace(&self, namespace: &Namespace) -> bool {
        let map = self.namespaces.read().expect("lock poisoned");
        map.contains_key(namespace)
    }

    /// Number of objects in a namespace (0 if it does not exist).
    pub fn object_count(&self, namespace: &Namespace) -> usize {
        let map = self.namespaces.read().expect("lock poisoned");
        map.get(namespace).map_or(0, HashMap::len)
    }

    /// Sorted keys of all objects in a namespace.
    pub fn keys(&self, namespace: &Namespace) -> Vec<String> {
        let map = self.namespaces.read().expect("lock poisoned");
        let mut keys: Vec<String> = map
            .get(namespace)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Insert an object directly, creating the namespace if needed.
    ///
    /// Bypasses capacity checks and operation counters. Tests use it to
    /// pre-populate or corrupt a store.
    pub fn insert(&self, namespace: &Namespace, key: &str, data: impl Into<Bytes>) {
        let mut map = self.namespaces.write().expect("lock poisoned");
        map.entry(namespace.clone())
            .or_default()
            .insert(key.to_owned(), data.into());
    }

    fn used_bytes_unlocked(map: &HashMap<Namespace, Objects>) -> u64 {
        map.values()
            .flat_map(|objects| objects.values())
            .map(|v| v.len() as u64)
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait::async_trait]
impl ChunkStore for MemoryStore {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        self.ops.ensure_namespace.fetch_add(1, Ordering::Relaxed);
        let mut map = self.namespaces.write().expect("lock poisoned");
        if !map.contains_key(namespace) {
            debug!(%namespace, "created namespace in memory");
            map.insert(namespace.clone(), Objects::new());
        }
        Ok(())
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        self.ops.exists.fetch_add(1, Ordering::Relaxed);
        let map = self.namespaces.read().expect("lock poisoned");
        let objects = map
            .get(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.clone()))?;
        Ok(objects.contains_key(key))
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.ops.put.fetch_add(1, Ordering::Relaxed);
        let mut map = self.namespaces.write().expect("lock poisoned");
        let used = Self::used_bytes_unlocked(&map);
        let objects = map
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.clone()))?;

        // Replacing an existing object frees its old space.
        let existing_len = objects.get(key).map_or(0, |v| v.len() as u64);
        let net_increase = (data.len() as u64).saturating_sub(existing_len);

        if used.saturating_add(net_increase) > self.max_bytes {
            return Err(StoreError::CapacityExceeded {
                needed: net_increase,
                available: self.max_bytes.saturating_sub(used),
            });
        }

        debug!(%namespace, key, size = data.len(), "storing object in memory");
        objects.insert(key.to_owned(), data);
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        self.ops.get.fetch_add(1, Ordering::Relaxed);
        let map = self.namespaces.read().expect("lock poisoned");
        let objects = map
            .get(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.clone()))?;
        objects.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            namespace: namespace.clone(),
            key: key.to_owned(),
        })
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        self.ops.size.fetch_add(1, Ordering::Relaxed);
        let map = self.namespaces.read().expect("lock poisoned");
        let objects = map
            .get(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.clone()))?;
        objects
            .get(key)
            .map(|v| v.len() as u64)
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.clone(),
                key: key.to_owned(),
            })
    }
}

//! File-based chunk storage backend.
//!
//! Each namespace is a directory under the store root. Hash-named objects
//! fan out by their first two hex characters:
//! `{root}/{namespace}/{key[0..2]}/{key}`. Other keys (such as
//! `images/disk/manifest.json`) map their `/`-separated segments onto
//! subdirectories.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use forkup_types::Namespace;
use rand::Rng;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// File-based chunk store.
///
/// Writes are atomic: data is written to a uniquely named temporary file
/// first, then renamed into place. Concurrent writers of the same key never
/// share a temporary file, and readers never see a half-written object.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    /// Compute the full file path for an object.
    fn object_path(&self, namespace: &Namespace, key: &str) -> Result<PathBuf, StoreError> {
        let segments: Vec<&str> = key.split('/').collect();
        let valid = !key.is_empty()
            && !key.contains('\\')
            && segments
                .iter()
                .all(|s| !s.is_empty() && *s != "." && *s != ".." && !s.ends_with(".tmp"));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }

        let mut path = self.namespace_dir(namespace);
        if segments.len() == 1 && key.len() > 2 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
            path.push(&key[0..2]);
            path.push(key);
        } else {
            path.extend(segments);
        }
        Ok(path)
    }

    async fn require_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        match tokio::fs::metadata(self.namespace_dir(namespace)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::NamespaceNotFound(namespace.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NamespaceNotFound(namespace.clone()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn not_found(namespace: &Namespace, key: &str) -> StoreError {
        StoreError::NotFound {
            namespace: namespace.clone(),
            key: key.to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl ChunkStore for FileStore {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        let dir = self.namespace_dir(namespace);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(%namespace, path = %dir.display(), "ensured namespace directory");
        Ok(())
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(namespace, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.require_namespace(namespace).await?;
                Ok(false)
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.object_path(namespace, key)?;
        self.require_namespace(namespace).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let suffix: u64 = rand::rng().random();
        let tmp_path = path.with_file_name(format!("{}.{suffix:016x}.tmp", file_name(&path)));
        if let Err(e) = tokio::fs::write(&tmp_path, &data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(e));
        }
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(%namespace, key, path = %path.display(), size = data.len(), "stored object to file");
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        let path = self.object_path(namespace, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.require_namespace(namespace).await?;
                Err(Self::not_found(namespace, key))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        let path = self.object_path(namespace, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(Self::not_found(namespace, key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.require_namespace(namespace).await?;
                Err(Self::not_found(namespace, key))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

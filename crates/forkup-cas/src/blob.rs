//! Positional reads over the local blob.
//!
//! Every read names its own offset. There is no shared cursor, so any number
//! of workers can read from one [`FileBlob`] at the same time.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::CasError;

/// Byte-range access to the blob being synced.
#[async_trait::async_trait]
pub trait BlobSource: Send + Sync {
    /// Total blob length in bytes.
    async fn length(&self) -> Result<u64, CasError>;

    /// Read exactly `size` bytes starting at `offset`.
    ///
    /// Fails with [`CasError::ShortRead`] if the blob ends before
    /// `offset + size`.
    async fn read_range(&self, offset: u64, size: u64) -> Result<Bytes, CasError>;
}

/// A blob backed by a file on disk, read with `pread`-style calls.
#[derive(Clone)]
pub struct FileBlob {
    file: Arc<File>,
    path: PathBuf,
}

impl FileBlob {
    /// Open a blob file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CasError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    /// Path the blob was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl BlobSource for FileBlob {
    async fn length(&self) -> Result<u64, CasError> {
        let file = self.file.clone();
        let meta = tokio::task::spawn_blocking(move || file.metadata())
            .await
            .map_err(io::Error::other)??;
        Ok(meta.len())
    }

    async fn read_range(&self, offset: u64, size: u64) -> Result<Bytes, CasError> {
        let file = self.file.clone();
        let data = tokio::task::spawn_blocking(move || read_exact_at(&file, offset, size))
            .await
            .map_err(io::Error::other)??;
        trace!(path = %self.path.display(), offset, size, "read blob range");
        Ok(data)
    }
}

/// Read `size` bytes at `offset` without touching any file cursor.
fn read_exact_at(file: &File, offset: u64, size: u64) -> Result<Bytes, CasError> {
    // Check the length first so a bogus manifest size never drives a huge allocation.
    let len = file.metadata()?.len();
    let available = len.saturating_sub(offset);
    if available < size {
        return Err(CasError::ShortRead {
            offset,
            expected: size,
            actual: available,
        });
    }

    let wanted = usize::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk size exceeds usize"))?;
    let mut buf = vec![0u8; wanted];
    let mut filled = 0usize;
    while filled < wanted {
        match pread(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    // The file can shrink between the length check and the read.
    if filled < wanted {
        return Err(CasError::ShortRead {
            offset,
            expected: size,
            actual: filled as u64,
        });
    }
    Ok(Bytes::from(buf))
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

/// A blob held in memory. Used by tests and for small inputs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlob {
    data: Bytes,
}

impl MemoryBlob {
    /// Wrap a byte buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait::async_trait]
impl BlobSource for MemoryBlob {
    async fn length(&self) -> Result<u64, CasError> {
        Ok(self.data.len() as u64)
    }

    async fn read_range(&self, offset: u64, size: u64) -> Result<Bytes, CasError> {
        let len = self.data.len() as u64;
        let available = len.saturating_sub(offset);
        if available < size {
            return Err(CasError::ShortRead {
                offset,
                expected: size,
                actual: available,
            });
        }
        let start = offset as usize;
        Ok(self.data.slice(start..start + size as usize))
    }
}

//! Integration test: a blob and manifest on disk synced into each backend.

use std::sync::Arc;

use forkup_engine::{NamespacePolicy, SyncConfig, SyncOutcome};
use forkup_integration_tests::{Fixture, workers};
use forkup_store::{ChunkStore, FileStore, MemoryStore};
use forkup_types::{DigestAlgorithm, Namespace};

/// 1 MiB blob in 16 KiB chunks into a file store. Every chunk lands on disk
/// with the exact bytes of its blob range.
#[tokio::test]
async fn test_sync_into_file_store() {
    let fx = Fixture::new("disk.img", 1024 * 1024, 16 * 1024, 1);
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(store_dir.path()).unwrap());

    let report = fx
        .session(store.clone(), workers(4))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome(), SyncOutcome::Synced);
    assert_eq!(report.total, 64);
    assert_eq!(report.uploaded, 64);
    assert_eq!(report.already_existing, 0);

    let ns = Namespace::default();
    let mut offset = 0usize;
    for chunk in &fx.chunks {
        let stored = store.get(&ns, chunk.hash.as_str()).await.unwrap();
        let end = offset + chunk.size as usize;
        assert_eq!(stored.as_ref(), &fx.data[offset..end], "chunk at {offset}");
        offset = end;
    }
}

/// The same blob synced twice: the second run uploads nothing.
#[tokio::test]
async fn test_second_run_is_a_noop() {
    let fx = Fixture::new("disk.img", 256 * 1024, 4096, 2);
    let store = Arc::new(MemoryStore::unbounded());

    let first = fx.session(store.clone(), workers(3)).await.run().await.unwrap();
    assert_eq!(first.uploaded, 64);

    store.reset_ops();
    let second = fx.session(store.clone(), workers(5)).await.run().await.unwrap();
    assert!(second.is_synced());
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.already_existing, 64);
    assert_eq!(store.ops().put, 0);
}

/// Newline-separated manifests sync exactly like JSON ones.
#[tokio::test]
async fn test_lines_manifest_file() {
    let fx = Fixture::new("disk.img", 100_000, 7000, 3);
    fx.use_lines_manifest();

    let store = Arc::new(MemoryStore::unbounded());
    let report = fx.session(store.clone(), workers(2)).await.run().await.unwrap();

    assert!(report.is_synced());
    // 14 full chunks and one 2000-byte tail.
    assert_eq!(report.total, 15);
    assert_eq!(store.keys(&Namespace::default()), fx.unique_hashes());
}

/// Per-blob namespaces are named after the blob file.
#[tokio::test]
async fn test_per_blob_namespace_from_file_name() {
    let fx = Fixture::new("Root_FS.ext4", 32 * 1024, 8192, 4);
    let store = Arc::new(MemoryStore::unbounded());
    let config = SyncConfig {
        workers: Some(2),
        namespace: NamespacePolicy::PerBlob,
        ..SyncConfig::default()
    };

    let session = fx.session(store.clone(), config).await;
    let ns = session.namespace();
    assert_eq!(ns.as_str(), "root-fs.ext4");

    session.run().await.unwrap();
    assert_eq!(store.object_count(&ns), 4);
    assert!(!store.has_namespace(&Namespace::default()));
}

/// Digest verification over real file reads, followed by manifest publication.
#[tokio::test]
async fn test_verified_sync_publishes_manifest() {
    let fx = Fixture::new("disk.img", 64 * 1024, 4096, 5);
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(store_dir.path()).unwrap());
    let config = SyncConfig {
        workers: Some(4),
        verify_digest: Some(DigestAlgorithm::Sha256),
        manifest_prefix: Some("images/disk".to_string()),
        ..SyncConfig::default()
    };

    let report = fx.session(store.clone(), config).await.run().await.unwrap();
    assert!(report.is_synced());
    assert_eq!(report.manifest_keys.len(), 2);
    assert_eq!(report.manifest_keys[0], "images/disk/manifest.json");

    let ns = Namespace::default();
    let published = store.get(&ns, &report.manifest_keys[0]).await.unwrap();
    let by_digest = store.get(&ns, &report.manifest_keys[1]).await.unwrap();
    assert_eq!(published, by_digest);
    assert_eq!(published.as_ref(), fx.manifest().await.to_json().as_bytes());
}

/// A blob file truncated after the manifest was written aborts before any
/// store traffic.
#[tokio::test]
async fn test_truncated_blob_file_aborts() {
    let fx = Fixture::new("disk.img", 40_000, 10_000, 6);
    std::fs::write(&fx.blob_path, &fx.data[..25_000]).unwrap();

    let store = Arc::new(MemoryStore::unbounded());
    let result = fx.session(store.clone(), workers(2)).await.run().await;

    assert!(result.is_err());
    assert_eq!(store.ops().total(), 0);
}

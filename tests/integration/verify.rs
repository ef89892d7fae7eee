//! Integration test: checking a store against a manifest.

use std::sync::Arc;

use bytes::Bytes;
use forkup_engine::{ProblemKind, VerifyMode};
use forkup_integration_tests::{Fixture, workers};
use forkup_store::{ChunkStore, FileStore};
use forkup_types::Namespace;

/// Sync into a file store, damage two objects on disk, and verify.
#[tokio::test]
async fn test_verify_detects_damage_in_file_store() {
    let fx = Fixture::new("disk.img", 80 * 1024, 8192, 50);
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(store_dir.path()).unwrap());
    let ns = Namespace::default();

    fx.session(store.clone(), workers(3)).await.run().await.unwrap();

    let clean = fx
        .session(store.clone(), workers(3))
        .await
        .verify(VerifyMode::Deep)
        .await
        .unwrap();
    assert!(clean.is_clean());
    assert_eq!(clean.verified, 10);

    // Same length, different bytes: only a deep check notices.
    let flipped = fx.chunks[2].hash.as_str();
    let mut bytes = store.get(&ns, flipped).await.unwrap().to_vec();
    bytes[0] ^= 0xff;
    store.put(&ns, flipped, Bytes::from(bytes)).await.unwrap();

    // Wrong length: a size check is enough.
    let shortened = fx.chunks[7].hash.as_str();
    store
        .put(&ns, shortened, Bytes::from_static(b"short"))
        .await
        .unwrap();

    let shallow = fx
        .session(store.clone(), workers(3))
        .await
        .verify(VerifyMode::Size)
        .await
        .unwrap();
    assert_eq!(shallow.size_mismatch, 1);
    assert_eq!(shallow.content_mismatch, 0);
    assert_eq!(shallow.verified, 9);

    let deep = fx
        .session(store.clone(), workers(3))
        .await
        .verify(VerifyMode::Deep)
        .await
        .unwrap();
    assert_eq!(deep.size_mismatch, 1);
    assert_eq!(deep.content_mismatch, 1);
    assert_eq!(deep.verified, 8);
    let kinds: Vec<(usize, &ProblemKind)> =
        deep.problems.iter().map(|p| (p.index, &p.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (2, &ProblemKind::ContentMismatch),
            (7, &ProblemKind::SizeMismatch { stored: 5 }),
        ]
    );
}

/// Verification of a store that never saw the blob reports every chunk
/// missing and writes nothing.
#[tokio::test]
async fn test_verify_empty_store_reports_missing() {
    let fx = Fixture::new("disk.img", 20_000, 4000, 51);
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(store_dir.path()).unwrap());
    store.ensure_namespace(&Namespace::default()).await.unwrap();

    let report = fx
        .session(store, workers(2))
        .await
        .verify(VerifyMode::Size)
        .await
        .unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.missing, 5);
    assert_eq!(report.verified, 0);
}

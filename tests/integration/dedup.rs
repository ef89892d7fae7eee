//! Integration test: deduplication across runs, blobs and versions.

use std::sync::Arc;

use forkup_integration_tests::{Fixture, corrupt, test_data_seeded, workers};
use forkup_store::MemoryStore;
use forkup_types::Namespace;

const CHUNK: usize = 4096;

/// A new version of a blob with two modified regions uploads only the chunks
/// those regions touch.
#[tokio::test]
async fn test_modified_blob_uploads_changed_chunks_only() {
    let base = test_data_seeded(512 * 1024, 10);
    let v1 = Fixture::from_data("disk.img", base.clone(), CHUNK);

    let mut changed = base;
    // Inside chunk 3.
    corrupt(&mut changed, 3 * CHUNK + 100, 50);
    // Straddles chunks 40 and 41.
    corrupt(&mut changed, 41 * CHUNK - 10, 20);
    let v2 = Fixture::from_data("disk.img", changed, CHUNK);

    let store = Arc::new(MemoryStore::unbounded());
    let first = v1.session(store.clone(), workers(4)).await.run().await.unwrap();
    assert_eq!(first.uploaded, 128);

    let second = v2.session(store.clone(), workers(4)).await.run().await.unwrap();
    assert!(second.is_synced());
    assert_eq!(second.uploaded, 3);
    assert_eq!(second.already_existing, 125);
    assert_eq!(store.object_count(&Namespace::default()), 131);
}

/// Two blobs sharing a prefix share its chunks in the global namespace.
#[tokio::test]
async fn test_shared_chunks_across_blobs() {
    let shared = test_data_seeded(16 * CHUNK, 20);
    let mut a = shared.clone();
    a.extend(test_data_seeded(8 * CHUNK, 21));
    let mut b = shared;
    b.extend(test_data_seeded(4 * CHUNK, 22));

    let fa = Fixture::from_data("a.img", a, CHUNK);
    let fb = Fixture::from_data("b.img", b, CHUNK);
    let store = Arc::new(MemoryStore::unbounded());

    let ra = fa.session(store.clone(), workers(3)).await.run().await.unwrap();
    let rb = fb.session(store.clone(), workers(3)).await.run().await.unwrap();

    assert_eq!(ra.uploaded, 24);
    assert_eq!(rb.uploaded, 4);
    assert_eq!(rb.already_existing, 16);
    assert_eq!(store.object_count(&Namespace::default()), 28);
}

/// A blob made of one repeated block stores that block once. Workers racing
/// on the same hash may both upload it, but the object count stays at one.
#[tokio::test]
async fn test_repetitive_blob_stores_each_hash_once() {
    let block = test_data_seeded(CHUNK, 30);
    let data: Vec<u8> = block.iter().copied().cycle().take(64 * CHUNK).collect();
    let fx = Fixture::from_data("zeros.img", data, CHUNK);
    assert_eq!(fx.unique_hashes().len(), 1);

    let store = Arc::new(MemoryStore::unbounded());
    let report = fx.session(store.clone(), workers(8)).await.run().await.unwrap();

    assert!(report.is_synced());
    assert_eq!(report.uploaded + report.already_existing, 64);
    // At most one upload per worker slice.
    assert!(report.uploaded >= 1 && report.uploaded <= 8);
    assert_eq!(store.object_count(&Namespace::default()), 1);
}

/// Worker count never changes which objects end up in the store.
#[tokio::test]
async fn test_worker_count_does_not_change_result() {
    let fx = Fixture::new("disk.img", 300_000, 3000, 40);
    let mut key_sets = Vec::new();

    for count in [1, 3, 7, 32, 200] {
        let store = Arc::new(MemoryStore::unbounded());
        let report = fx.session(store.clone(), workers(count)).await.run().await.unwrap();
        assert!(report.is_synced(), "workers={count}");
        assert_eq!(report.total, 100);
        key_sets.push(store.keys(&Namespace::default()));
    }

    for keys in &key_sets[1..] {
        assert_eq!(keys, &key_sets[0]);
    }
}

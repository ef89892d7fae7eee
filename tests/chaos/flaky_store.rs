//! Chaos test: syncing through a slow, intermittently failing store.
//!
//! The store injects transient failures and random latency. With retries the
//! sync must converge; without them it must end partial, never corrupt.

use std::sync::Arc;
use std::time::Duration;

use forkup_engine::SyncOutcome;
use forkup_integration_tests::{Fixture, workers};
use forkup_store::{
    ChunkStore, FaultyStore, MemoryStore, RetryPolicy, RetryStore, SlowStore,
};
use forkup_types::Namespace;

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Transient failures behind a retrying store are invisible to the report.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retries_absorb_transient_failures() {
    let fx = Fixture::new("disk.img", 200 * 1024, 4096, 60);
    let backing = Arc::new(MemoryStore::unbounded());
    let slow: Arc<dyn ChunkStore> = Arc::new(
        SlowStore::new(backing.clone())
            .read_latency(0, 3)
            .write_latency(1, 5)
            .seed(7),
    );
    let faulty: Arc<dyn ChunkStore> = Arc::new(FaultyStore::new(slow).transient_failures(6));
    let store = Arc::new(RetryStore::new(faulty, fast_retries(8)));

    let report = fx.session(store, workers(8)).await.run().await.unwrap();

    assert_eq!(report.outcome(), SyncOutcome::Synced);
    assert_eq!(report.total, 50);
    assert_eq!(backing.keys(&Namespace::default()), fx.unique_hashes());
}

/// Failing puts without retries leave the sync partial. Whatever did land
/// is intact, and a second run against a healthy store finishes the job.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_sync_resumes_cleanly() {
    let fx = Fixture::new("disk.img", 64 * 1024, 4096, 61);
    let backing = Arc::new(MemoryStore::unbounded());
    let broken = [fx.chunks[5].hash.as_str(), fx.chunks[12].hash.as_str()];
    let faulty: Arc<dyn ChunkStore> =
        Arc::new(FaultyStore::new(backing.clone()).fail_puts_for(broken));

    let first = fx.session(faulty, workers(4)).await.run().await.unwrap();
    assert!(matches!(first.outcome(), SyncOutcome::Partial { .. }));
    assert!(first.error.is_some());
    assert!(first.unsynced() >= 2);

    let ns = Namespace::default();
    for key in backing.keys(&ns) {
        let index = fx
            .chunks
            .iter()
            .position(|c| c.hash.as_str() == key)
            .unwrap();
        let start = index * 4096;
        let stored = backing.get(&ns, &key).await.unwrap();
        assert_eq!(stored.as_ref(), &fx.data[start..start + 4096]);
    }

    let second = fx.session(backing.clone(), workers(4)).await.run().await.unwrap();
    assert!(second.is_synced());
    assert_eq!(second.uploaded, first.unsynced());
    assert_eq!(backing.keys(&ns), fx.unique_hashes());
}

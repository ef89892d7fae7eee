//! Static partitioning of the chunk list across workers.

use std::ops::Range;

/// Split `[0, chunks)` into `workers` contiguous, non-overlapping ranges.
///
/// Each range holds `ceil(chunks / workers)` indices except the last
/// non-empty one, which is truncated. When there are more workers than
/// chunks the trailing ranges are empty. A worker count of 0 is treated as 1.
pub fn partition(chunks: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let per_worker = chunks.div_ceil(workers);
    (0..workers)
        .map(|i| {
            let start = i.saturating_mul(per_worker).min(chunks);
            let end = start.saturating_add(per_worker).min(chunks);
            start..end
        })
        .collect()
}

/// Resolve a configured worker count, defaulting to the available
/// hardware parallelism. Never returns less than 1.
pub fn resolve_workers(configured: Option<usize>) -> usize {
    configured
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1)
}

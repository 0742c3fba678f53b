//! Local ordering of a worker's keys
use std::ops::Range;

use itertools::Itertools;
use log::trace;
use rayon::{iter::ParallelIterator, slice::ParallelSlice, ThreadPool, ThreadPoolBuilder};

use crate::types::{ChunkMerge, Key, Result, SortOrder};

/// Buffers at or below this size are always sorted on the calling thread
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10_000;

/// Sort a slice on the calling thread
pub fn sort_sequential<K: Key>(data: &mut [K], order: SortOrder) {
    match order {
        SortOrder::Ascending => data.sort_unstable(),
        SortOrder::Descending => data.sort_unstable_by(|a, b| b.cmp(a)),
    }
}

/// Split `len` elements into `chunks` contiguous ranges, the last absorbing the remainder
pub fn chunk_bounds(len: usize, chunks: usize) -> Vec<Range<usize>> {
    let chunks = chunks.max(1);
    let size = len / chunks;
    (0..chunks)
        .map(|i| {
            let start = i * size;
            let end = if i == chunks - 1 { len } else { start + size };
            start..end
        })
        .collect()
}

/// Sorts a worker's local buffer, in parallel once it is large enough.
///
/// The parallel path cuts the buffer into one contiguous chunk per thread,
/// sorts the chunks concurrently, then restores order across chunk
/// boundaries as configured by [`ChunkMerge`]. The result never depends on the
/// number of threads.
pub struct LocalSorter {
    pool: ThreadPool,
    threshold: usize,
    merge: ChunkMerge,
}

impl LocalSorter {
    /// Create a sorter backed by a pool of `num_threads` threads
    pub fn new(num_threads: usize, threshold: usize, merge: ChunkMerge) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("distsort-sort-{i}"))
            .build()?;
        Ok(Self {
            pool,
            threshold,
            merge,
        })
    }

    /// The thread pool shared by every threaded stage of this worker
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Number of threads
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Sort `data` in the given order
    pub fn sort<K: Key>(&self, data: &mut Vec<K>, order: SortOrder) {
        if data.len() > self.threshold && self.num_threads() > 1 {
            self.sort_chunked(data, order);
        } else {
            sort_sequential(data, order);
        }
    }

    /// Chunked parallel sort regardless of the buffer size
    pub fn sort_chunked<K: Key>(&self, data: &mut Vec<K>, order: SortOrder) {
        let bounds = chunk_bounds(data.len(), self.num_threads());
        trace!("sorting {} keys in chunks {:?}", data.len(), bounds);

        // Each thread owns one disjoint chunk
        let mut chunks = Vec::with_capacity(bounds.len());
        let mut rest = &mut data[..];
        for range in &bounds {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            rest = tail;
            chunks.push(chunk);
        }
        self.pool.scope(|scope| {
            for chunk in chunks {
                scope.spawn(move |_| sort_sequential(chunk, order));
            }
        });

        match self.merge {
            ChunkMerge::Resort => sort_sequential(data, order),
            ChunkMerge::KWayMerge => {
                let chunks = bounds
                    .iter()
                    .map(|range| data[range.clone()].iter().copied());
                let merged: Vec<K> = match order {
                    SortOrder::Ascending => chunks.kmerge_by(|a, b| a < b).collect(),
                    SortOrder::Descending => chunks.kmerge_by(|a, b| a > b).collect(),
                };
                *data = merged;
            }
        }
    }

    /// Check that `data` is in order; every thread checks a block and the answers are ANDed
    pub fn is_ordered<K: Key>(&self, data: &[K], order: SortOrder) -> bool {
        self.pool
            .install(|| data.par_windows(2).all(|w| order.in_order(&w[0], &w[1])))
    }
}

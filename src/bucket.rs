//! Grouping a shard by destination worker
use std::ops::Range;

use log::debug;
use parking_lot::Mutex;
use rayon::{iter::ParallelIterator, slice::ParallelSlice, ThreadPool};

use crate::comm::displacements;
use crate::partition::RangePartitioner;
use crate::types::Key;

/// Count how many keys of `shard` go to each destination.
///
/// The shard is split into one block per pool thread, each block is counted
/// into a private array and the private arrays are added into the shared one
/// under a lock.
pub fn count_destinations<K: Key>(
    shard: &[K],
    partitioner: &RangePartitioner,
    pool: &ThreadPool,
) -> Vec<usize> {
    let partitions = partitioner.partitions();
    let counts = Mutex::new(vec![0usize; partitions]);
    if shard.is_empty() {
        return counts.into_inner();
    }

    let block = shard.len().div_ceil(pool.current_num_threads().max(1));
    pool.install(|| {
        shard.par_chunks(block).for_each(|part| {
            let mut local = vec![0usize; partitions];
            for &value in part {
                local[partitioner.destination(value)] += 1;
            }
            let mut shared = counts.lock();
            for (total, count) in shared.iter_mut().zip(local) {
                *total += count;
            }
        })
    });
    counts.into_inner()
}

/// The keys of one shard laid out bucket after bucket.
///
/// All buckets live in one arena sized to the shard; bucket `d` is the range
/// `offsets[d]..offsets[d] + counts[d]`. Keys of the same bucket keep their
/// order from the shard, so the arena is ready to be handed to the exchange.
#[derive(Debug, Clone)]
pub struct Buckets<K> {
    arena: Vec<K>,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl<K: Key> Buckets<K> {
    /// Bucketize a shard, consuming it
    pub fn new(shard: Vec<K>, partitioner: &RangePartitioner, pool: &ThreadPool) -> Self {
        let counts = count_destinations(&shard, partitioner, pool);
        let offsets = displacements(&counts);

        let mut cursor = offsets.clone();
        let mut arena = vec![K::zero(); shard.len()];
        for value in shard {
            let destination = partitioner.destination(value);
            arena[cursor[destination]] = value;
            cursor[destination] += 1;
        }
        debug!("bucketized {} keys into {:?}", arena.len(), counts);

        Self {
            arena,
            counts,
            offsets,
        }
    }

    /// Number of keys per destination
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Index range of a destination's bucket within the arena
    pub fn range(&self, destination: usize) -> Range<usize> {
        self.offsets[destination]..self.offsets[destination] + self.counts[destination]
    }

    /// Keys bound for `destination`
    pub fn bucket(&self, destination: usize) -> &[K] {
        &self.arena[self.range(destination)]
    }

    /// All keys, bucket after bucket
    pub fn as_slice(&self) -> &[K] {
        &self.arena
    }

    /// Number of buckets
    pub fn num_buckets(&self) -> usize {
        self.counts.len()
    }

    /// Total number of keys
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Check if no keys are held
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

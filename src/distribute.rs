//! Splitting the global array into per-worker shards
use log::debug;

use crate::traits::Communicator;
use crate::types::{Key, ROOT};

/// The contiguous part of the global array assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    /// Index of the first element
    pub offset: usize,
    /// Number of elements
    pub len: usize,
}

/// How `n` elements are split across `workers`.
///
/// Every worker gets `n / workers` elements and the first `n % workers`
/// workers one more. Any worker can compute this from `(n, workers)` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDistribution {
    shards: Vec<ShardRange>,
}

impl WorkDistribution {
    /// Split `n` elements across `workers` workers
    pub fn new(n: usize, workers: usize) -> Self {
        let workers = workers.max(1);
        let base = n / workers;
        let remainder = n % workers;

        let mut offset = 0;
        let shards = (0..workers)
            .map(|rank| {
                let len = base + usize::from(rank < remainder);
                let shard = ShardRange { offset, len };
                offset += len;
                shard
            })
            .collect();
        Self { shards }
    }

    /// Shard of every worker in rank order
    pub fn shards(&self) -> &[ShardRange] {
        &self.shards
    }

    /// Shard of one worker
    pub fn shard(&self, rank: usize) -> ShardRange {
        self.shards[rank]
    }

    /// Shard lengths in rank order
    pub fn counts(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.len).collect()
    }

    /// Total number of elements
    pub fn total(&self) -> usize {
        self.shards.iter().map(|s| s.len).sum()
    }
}

/// Deliver every worker its shard of the root's global array.
///
/// `input` is only read on the root and must hold `n` elements there.
pub fn scatter<C: Communicator, K: Key>(comm: &C, input: Option<&[K]>, n: usize) -> Vec<K> {
    let distribution = WorkDistribution::new(n, comm.size());
    let shard = comm.scatter_varcount(ROOT, input, &distribution.counts());
    debug!(
        "rank {}: received shard of {} elements",
        comm.rank(),
        shard.len()
    );
    shard
}

#[cfg(test)]
mod test {
    use super::{scatter, ShardRange, WorkDistribution};
    use crate::comm::LocalUniverse;
    use crate::traits::Communicator;

    #[test]
    fn test_even_split() {
        let distribution = WorkDistribution::new(12, 4);
        assert_eq!(distribution.counts(), vec![3, 3, 3, 3]);
        assert_eq!(distribution.shard(2), ShardRange { offset: 6, len: 3 });
    }

    #[test]
    fn test_remainder_goes_to_lowest_ranks() {
        let distribution = WorkDistribution::new(10, 4);
        assert_eq!(distribution.counts(), vec![3, 3, 2, 2]);
        assert_eq!(distribution.total(), 10);
        assert_eq!(distribution.shard(1), ShardRange { offset: 3, len: 3 });
        assert_eq!(distribution.shard(3), ShardRange { offset: 8, len: 2 });
    }

    #[test]
    fn test_no_gaps_or_overlaps() {
        for n in 0..50 {
            for workers in 1..9 {
                let distribution = WorkDistribution::new(n, workers);
                let mut next = 0;
                for shard in distribution.shards() {
                    assert_eq!(shard.offset, next);
                    next += shard.len;
                }
                assert_eq!(next, n);
                let extra = distribution
                    .shards()
                    .iter()
                    .filter(|s| s.len == n / workers + 1)
                    .count();
                if n % workers != 0 {
                    assert_eq!(extra, n % workers);
                }
            }
        }
    }

    #[test]
    fn test_fewer_elements_than_workers() {
        let distribution = WorkDistribution::new(2, 5);
        assert_eq!(distribution.counts(), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_scatter() {
        let universe = LocalUniverse::new(3).unwrap();
        let input: Vec<i32> = (0..8).collect();
        let shards = universe
            .run(|comm| {
                let input = (comm.rank() == 0).then_some(&input[..]);
                scatter(comm, input, 8)
            })
            .unwrap();
        assert_eq!(shards, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7]]);
    }
}

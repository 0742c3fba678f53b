//! End-to-end drivers: distributed full sort and distributed top-K
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::bucket::Buckets;
use crate::distribute::scatter;
use crate::exchange::redistribute;
use crate::gather::{gather_sorted, Gathered};
use crate::oracle::{is_sorted_descending, verify_partition_ranges, verify_sort, verify_topk};
use crate::ordering::{LocalSorter, DEFAULT_PARALLEL_THRESHOLD};
use crate::partition::RangePartitioner;
use crate::timing::Timings;
use crate::topk::{apply_policy, extract_local_topk, gather_reduce, tree_reduce};
use crate::traits::Communicator;
use crate::types::{
    ChunkMerge, DistSortError, Key, Result, SortOrder, TopKMode, TopKPolicy, DEFAULT_MAX_VALUE,
    ROOT,
};

/// Status reported by every worker when the coordinator was not handed a usable input
pub const MISSING_INPUT_CODE: i32 = 2;

/// Status reported by every worker when a top-K input holds a negative key
pub const NEGATIVE_KEY_CODE: i32 = 3;

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Threads per worker
    num_threads: usize,
    /// Exclusive upper bound of the key domain, used for range partitioning
    max_value: i64,
    /// Local buffers larger than this are sorted in parallel
    parallel_threshold: usize,
    /// How the parallel sort resolves order across chunks
    chunk_merge: ChunkMerge,
    /// How the global top-K is computed
    topk_mode: TopKMode,
    /// What a top-K short of real keys looks like
    topk_policy: TopKPolicy,
    /// Check the result against the reference on the coordinator
    verify: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            num_threads: 4,
            max_value: DEFAULT_MAX_VALUE,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            chunk_merge: ChunkMerge::KWayMerge,
            topk_mode: TopKMode::Bucketed,
            topk_policy: TopKPolicy::Padded,
            verify: true,
        }
    }
}

impl PipelineOptions {
    /// Set the number of threads per worker
    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
    }

    /// Set the exclusive upper bound of the key domain
    pub fn set_max_value(&mut self, max_value: i64) {
        self.max_value = max_value;
    }

    /// Set the size above which local sorts run in parallel
    pub fn set_parallel_threshold(&mut self, threshold: usize) {
        self.parallel_threshold = threshold;
    }

    /// Set how chunk boundaries are resolved by the parallel sort
    pub fn set_chunk_merge(&mut self, merge: ChunkMerge) {
        self.chunk_merge = merge;
    }

    /// Set the top-K strategy
    pub fn set_topk_mode(&mut self, mode: TopKMode) {
        self.topk_mode = mode;
    }

    /// Set the top-K shortfall policy
    pub fn set_topk_policy(&mut self, policy: TopKPolicy) {
        self.topk_policy = policy;
    }

    /// Enable or disable verification on the coordinator
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Threads per worker
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Exclusive upper bound of the key domain
    pub fn max_value(&self) -> i64 {
        self.max_value
    }

    /// Top-K strategy
    pub fn topk_mode(&self) -> TopKMode {
        self.topk_mode
    }

    /// Top-K shortfall policy
    pub fn topk_policy(&self) -> TopKPolicy {
        self.topk_policy
    }

    fn sorter(&self) -> Result<LocalSorter> {
        LocalSorter::new(self.num_threads, self.parallel_threshold, self.chunk_merge)
    }
}

/// What one worker knows after a distributed sort
#[derive(Debug)]
pub struct SortOutcome<K> {
    /// Rank of the worker
    pub rank: usize,
    /// Number of keys this worker owned and sorted after the exchange
    pub local_len: usize,
    /// The globally sorted array, on the coordinator only
    pub sorted: Option<Gathered<K>>,
    /// Verification result, on the coordinator only and when enabled
    pub verified: Option<bool>,
    /// Time spent by this worker
    pub timings: Timings,
}

/// What one worker knows after a distributed top-K
#[derive(Debug)]
pub struct TopKOutcome<K> {
    /// Rank of the worker
    pub rank: usize,
    /// K after clamping to the array size
    pub k: usize,
    /// The K largest keys in descending order, on the coordinator only
    pub top: Option<Vec<K>>,
    /// Verification result, on the coordinator only and when enabled
    pub verified: Option<bool>,
    /// Time spent by this worker
    pub timings: Timings,
}

/// Abort the group unless the root holds exactly `n` keys
fn check_input<C: Communicator, K: Key>(comm: &C, input: Option<&[K]>, n: usize) {
    if !comm.is_rank(ROOT) {
        return;
    }
    match input {
        Some(input) if input.len() == n => {}
        Some(input) => {
            error!("the coordinator holds {} keys, expected {}", input.len(), n);
            comm.abort(MISSING_INPUT_CODE)
        }
        None => {
            error!("the coordinator must own the input array");
            comm.abort(MISSING_INPUT_CODE)
        }
    }
}

/// Abort the group if a key on the root is below zero
fn check_non_negative<C: Communicator, K: Key>(comm: &C, input: Option<&[K]>) {
    let Some(input) = input.filter(|_| comm.is_rank(ROOT)) else {
        return;
    };
    if let Some(key) = input.iter().find(|key| key.is_negative()) {
        error!("top-K keys must not be negative, found {key:?}");
        comm.abort(NEGATIVE_KEY_CODE)
    }
}

/// Sort `n` keys across the group.
///
/// Must be called by every worker with the same `n` and options; `input` is
/// the global array on the root and ignored elsewhere. The root receives the
/// fully sorted array.
pub fn bucket_sort<C: Communicator, K: Key>(
    comm: &C,
    input: Option<Vec<K>>,
    n: usize,
    options: &PipelineOptions,
) -> Result<SortOutcome<K>> {
    let rank = comm.rank();
    let sorter = options.sorter()?;
    let partitioner = RangePartitioner::new(comm.size(), options.max_value)?;
    check_input(comm, input.as_deref(), n);

    let mut timings = Timings::default();
    comm.barrier();
    let start = Instant::now();

    let shard = timings.communication(|| scatter(comm, input.as_deref(), n));
    let buckets = timings.compute(|| Buckets::new(shard, &partitioner, sorter.pool()));
    let mut local = timings
        .communication(|| redistribute(comm, buckets))
        .into_inner();
    timings.compute(|| sorter.sort(&mut local, SortOrder::Ascending));
    debug!("rank {rank}: sorted {} owned keys", local.len());
    let sorted = timings.communication(|| gather_sorted(comm, &local));

    comm.barrier();
    timings.total = start.elapsed();

    let verified = match (&sorted, &input) {
        (Some(sorted), Some(input)) if options.verify => Some(
            sorter.is_ordered(sorted.as_slice(), SortOrder::Ascending)
                && verify_partition_ranges(sorted, &partitioner)
                && verify_sort(input, sorted.as_slice()),
        ),
        _ => None,
    };
    if let Some(sorted) = &sorted {
        info!(
            "sorted {} keys on {} workers in {:?} (segments {:?}, verified {:?})",
            sorted.as_slice().len(),
            comm.size(),
            timings.total,
            sorted.counts(),
            verified
        );
    }

    Ok(SortOutcome {
        rank,
        local_len: local.len(),
        sorted,
        verified,
        timings,
    })
}

/// Validate K for the given mode, clamping it to `n` where the mode allows.
///
/// Diagnostics are logged when `is_root` is set.
pub fn effective_k(n: usize, k: usize, mode: TopKMode, is_root: bool) -> Result<usize> {
    if k == 0 || (k > n && mode == TopKMode::Gather) {
        if is_root {
            error!("usage: k ({k}) must be between 1 and the array size ({n})");
        }
        return Err(DistSortError::InvalidK { k, n });
    }
    if k > n {
        if is_root {
            warn!("k ({k}) exceeds the array size, clamping to {n}");
        }
        return Ok(n);
    }
    Ok(k)
}

/// Find the `k` largest of `n` keys across the group.
///
/// Must be called by every worker with the same `n`, `k` and options. An
/// invalid K is detected by every worker before any communication.
///
/// Keys must not be negative. Partial lists are padded with −1, so a negative
/// key on the root aborts the group with [`NEGATIVE_KEY_CODE`].
pub fn top_k<C: Communicator, K: Key>(
    comm: &C,
    input: Option<Vec<K>>,
    n: usize,
    k: usize,
    options: &PipelineOptions,
) -> Result<TopKOutcome<K>> {
    let rank = comm.rank();
    let mode = options.topk_mode;
    let k = effective_k(n, k, mode, comm.is_rank(ROOT))?;
    let sorter = options.sorter()?;
    let partitioner = RangePartitioner::new(comm.size(), options.max_value)?;
    check_input(comm, input.as_deref(), n);
    check_non_negative(comm, input.as_deref());

    let mut timings = Timings::default();
    comm.barrier();
    let start = Instant::now();

    let shard = timings.communication(|| scatter(comm, input.as_deref(), n));
    let local = match mode {
        TopKMode::Bucketed => {
            let buckets = timings.compute(|| Buckets::new(shard, &partitioner, sorter.pool()));
            timings
                .communication(|| redistribute(comm, buckets))
                .into_inner()
        }
        TopKMode::TreeReduce | TopKMode::Gather => shard,
    };

    let mut partial = timings.compute(|| extract_local_topk(&local, k, &sorter));
    let top = match mode {
        TopKMode::Gather => {
            partial.truncate(local.len());
            gather_reduce(comm, &partial, k, &sorter, &mut timings)
        }
        TopKMode::TreeReduce | TopKMode::Bucketed => tree_reduce(comm, partial, k, &mut timings),
    };
    drop(local);

    comm.barrier();
    timings.total = start.elapsed();

    let top = top.map(|top| apply_policy(top, options.topk_policy));
    let verified = match (&top, &input) {
        (Some(top), Some(input)) if options.verify => {
            let ordered = is_sorted_descending(top);
            Some(ordered && verify_topk(input, top, k, options.topk_policy))
        }
        _ => None,
    };
    if let Some(top) = &top {
        info!(
            "top-{k} of {n} keys on {} workers ({mode:?}) in {:?}, verified {:?}",
            comm.size(),
            timings.total,
            verified
        );
        debug!("top-{k} head: {:?}", &top[..top.len().min(10)]);
    }

    Ok(TopKOutcome {
        rank,
        k,
        top,
        verified,
        timings,
    })
}

#[cfg(test)]
mod test {
    use super::{bucket_sort, effective_k, top_k, PipelineOptions};
    use crate::comm::LocalUniverse;
    use crate::traits::Communicator;
    use crate::types::{DistSortError, TopKMode};

    const SCENARIO: [i32; 10] = [5, 1, 9, 3, 7, 2, 8, 4, 6, 0];

    fn scenario_options() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.set_max_value(10);
        options.set_num_threads(2);
        options
    }

    #[test]
    fn test_effective_k() {
        assert_eq!(effective_k(10, 3, TopKMode::Gather, false).unwrap(), 3);
        assert_eq!(
            effective_k(10, 30, TopKMode::TreeReduce, false).unwrap(),
            10
        );
        assert_eq!(effective_k(10, 30, TopKMode::Bucketed, false).unwrap(), 10);
        assert!(matches!(
            effective_k(10, 30, TopKMode::Gather, false),
            Err(DistSortError::InvalidK { k: 30, n: 10 })
        ));
        assert!(effective_k(10, 0, TopKMode::TreeReduce, false).is_err());
    }

    #[test]
    fn test_scenario_sort() {
        let universe = LocalUniverse::new(2).unwrap();
        let options = scenario_options();
        let outcomes = universe
            .run(|comm| {
                let input = (comm.rank() == 0).then(|| SCENARIO.to_vec());
                bucket_sort(comm, input, 10, &options).unwrap()
            })
            .unwrap();

        let root = &outcomes[0];
        let sorted = root.sorted.as_ref().unwrap();
        assert_eq!(sorted.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(sorted.counts(), &[5, 5]);
        assert_eq!(root.verified, Some(true));
        assert!(outcomes[1].sorted.is_none());
        assert_eq!(outcomes[1].local_len, 5);
    }

    #[test]
    fn test_scenario_topk() {
        for mode in [TopKMode::TreeReduce, TopKMode::Bucketed, TopKMode::Gather] {
            let universe = LocalUniverse::new(2).unwrap();
            let mut options = scenario_options();
            options.set_topk_mode(mode);
            let outcomes = universe
                .run(|comm| {
                    let input = (comm.rank() == 0).then(|| SCENARIO.to_vec());
                    top_k(comm, input, 10, 3, &options).unwrap()
                })
                .unwrap();
            assert_eq!(outcomes[0].top, Some(vec![9, 8, 7]));
            assert_eq!(outcomes[0].verified, Some(true));
            assert!(outcomes[1].top.is_none());
        }
    }
}

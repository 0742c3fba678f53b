//! Independent reference results for verifying the distributed pipeline
//!
//! Only the coordinator runs these, after the pipeline has finished.
use itertools::Itertools;

use crate::gather::Gathered;
use crate::partition::RangePartitioner;
use crate::topk::apply_policy;
use crate::types::{sentinel, Key, TopKPolicy};

/// Check that `data` never decreases
pub fn is_sorted_ascending<K: Key>(data: &[K]) -> bool {
    data.iter().tuple_windows().all(|(a, b)| a <= b)
}

/// Check that `data` never increases
pub fn is_sorted_descending<K: Key>(data: &[K]) -> bool {
    data.iter().tuple_windows().all(|(a, b)| a >= b)
}

/// A sorted copy of the whole input
pub fn reference_sort<K: Key>(input: &[K]) -> Vec<K> {
    let mut sorted = input.to_vec();
    sorted.sort_unstable();
    sorted
}

/// The `k` largest keys of the whole input, shaped by the shortfall policy
pub fn reference_topk<K: Key>(input: &[K], k: usize, policy: TopKPolicy) -> Vec<K> {
    let mut sorted = input.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.truncate(k);
    sorted.resize(k, sentinel());
    apply_policy(sorted, policy)
}

/// Compare a distributed full sort with the reference
pub fn verify_sort<K: Key>(input: &[K], result: &[K]) -> bool {
    reference_sort(input) == result
}

/// Compare a distributed top-K with the reference.
///
/// Equal keys are indistinguishable, so the comparison is exact.
pub fn verify_topk<K: Key>(input: &[K], result: &[K], k: usize, policy: TopKPolicy) -> bool {
    reference_topk(input, k, policy) == result
}

/// Check that every worker's segment only holds keys of its own value range
pub fn verify_partition_ranges<K: Key>(
    gathered: &Gathered<K>,
    partitioner: &RangePartitioner,
) -> bool {
    (0..gathered.counts().len()).all(|rank| {
        gathered
            .segment(rank)
            .iter()
            .all(|&v| partitioner.destination(v) == rank)
    })
}

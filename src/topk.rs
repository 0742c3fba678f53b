//! Top-K extraction and the tree reduction merging partial results
use log::{debug, trace};

use crate::ordering::LocalSorter;
use crate::timing::Timings;
use crate::traits::Communicator;
use crate::types::{sentinel, Key, SortOrder, TopKPolicy, ROOT};

/// The `k` largest keys of `local`, descending, padded with the sentinel up to `k`.
///
/// Sorts a private copy, `local` is left untouched.
pub fn extract_local_topk<K: Key>(local: &[K], k: usize, sorter: &LocalSorter) -> Vec<K> {
    let mut sorted = local.to_vec();
    sorter.sort(&mut sorted, SortOrder::Descending);
    sorted.truncate(k);
    sorted.resize(k, sentinel());
    sorted
}

/// Merge two descending lists, keeping the `k` largest keys, in O(k)
pub fn merge_topk<K: Key>(first: &[K], second: &[K], k: usize) -> Vec<K> {
    let mut merged = Vec::with_capacity(k.min(first.len() + second.len()));
    let (mut i, mut j) = (0, 0);
    while merged.len() < k && (i < first.len() || j < second.len()) {
        if j >= second.len() || (i < first.len() && first[i] >= second[j]) {
            merged.push(first[i]);
            i += 1;
        } else {
            merged.push(second[j]);
            j += 1;
        }
    }
    merged
}

/// Part played by a worker in one round of the tree reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receive the partner's list and merge it into ours
    Receive(usize),
    /// Hand our list to the partner and leave the reduction
    Send(usize),
    /// Nothing to do this round
    Idle,
}

/// Strides of the reduction rounds: 1, 2, 4, ... while below `size`
pub fn strides(size: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(1usize), |s| s.checked_mul(2)).take_while(move |&s| s < size)
}

/// Role of `rank` in the round with the given stride
pub fn round_role(rank: usize, stride: usize, size: usize) -> Role {
    let position = rank % (2 * stride);
    if position == 0 {
        if rank + stride < size {
            Role::Receive(rank + stride)
        } else {
            Role::Idle
        }
    } else if position == stride {
        Role::Send(rank - stride)
    } else {
        Role::Idle
    }
}

/// Merge every worker's length-`k` list along a binary tree.
///
/// Returns the global top-K on the root and `None` elsewhere. Takes
/// `ceil(log2 size)` rounds.
pub fn tree_reduce<C: Communicator, K: Key>(
    comm: &C,
    local: Vec<K>,
    k: usize,
    timings: &mut Timings,
) -> Option<Vec<K>> {
    let (rank, size) = (comm.rank(), comm.size());
    let mut current = local;

    for stride in strides(size) {
        match round_role(rank, stride, size) {
            Role::Receive(partner) => {
                let received = timings.communication(|| comm.receive(partner, k));
                current = timings.compute(|| merge_topk(&current, &received, k));
                trace!("rank {rank}: merged list of rank {partner} at stride {stride}");
            }
            Role::Send(partner) => {
                timings.communication(|| comm.send(partner, &current));
                debug!("rank {rank}: handed top-k to rank {partner} at stride {stride}");
                return None;
            }
            Role::Idle => {}
        }
    }
    comm.is_rank(ROOT).then_some(current)
}

/// Gather every worker's partial top-K to the root and keep the `k` largest there.
///
/// `local` holds at most `k` real keys, unpadded.
pub fn gather_reduce<C: Communicator, K: Key>(
    comm: &C,
    local: &[K],
    k: usize,
    sorter: &LocalSorter,
    timings: &mut Timings,
) -> Option<Vec<K>> {
    let gathered = timings.communication(|| {
        let counts = comm.gather_count(ROOT, local.len());
        comm.gather_varcount(ROOT, local, counts.as_deref())
    })?;
    Some(timings.compute(|| {
        let mut candidates = gathered;
        sorter.sort(&mut candidates, SortOrder::Descending);
        candidates.truncate(k);
        candidates
    }))
}

/// Apply the shortfall policy to a final top-K list
pub fn apply_policy<K: Key>(mut list: Vec<K>, policy: TopKPolicy) -> Vec<K> {
    if policy == TopKPolicy::Truncated {
        while list.last() == Some(&sentinel()) {
            list.pop();
        }
    }
    list
}

#[cfg(test)]
mod test {
    use super::{
        apply_policy, extract_local_topk, merge_topk, round_role, strides, tree_reduce, Role,
    };
    use crate::comm::LocalUniverse;
    use crate::ordering::LocalSorter;
    use crate::timing::Timings;
    use crate::traits::Communicator;
    use crate::types::{ChunkMerge, TopKPolicy};

    fn sorter() -> LocalSorter {
        LocalSorter::new(2, 4, ChunkMerge::KWayMerge).unwrap()
    }

    #[test]
    fn test_extract_pads_with_sentinel() {
        let top = extract_local_topk(&[4, 9, 1], 5, &sorter());
        assert_eq!(top, vec![9, 4, 1, -1, -1]);

        let top = extract_local_topk(&[4, 9, 1, 7, 7, 3], 3, &sorter());
        assert_eq!(top, vec![9, 7, 7]);

        let top = extract_local_topk::<i64>(&[], 2, &sorter());
        assert_eq!(top, vec![-1, -1]);
    }

    #[test]
    fn test_merge() {
        assert_eq!(merge_topk(&[9, 5, 1], &[8, 6, 2], 3), vec![9, 8, 6]);
        assert_eq!(merge_topk(&[9, 5, -1], &[-1, -1, -1], 3), vec![9, 5, -1]);
        assert_eq!(merge_topk(&[3, 3], &[3, 2], 3), vec![3, 3, 3]);
        assert_eq!(merge_topk::<i32>(&[], &[], 3), vec![]);
    }

    #[test]
    fn test_schedule() {
        assert_eq!(strides(1).count(), 0);
        assert_eq!(strides(5).collect::<Vec<_>>(), vec![1, 2, 4]);
        assert_eq!(strides(8).collect::<Vec<_>>(), vec![1, 2, 4]);

        assert_eq!(round_role(0, 1, 5), Role::Receive(1));
        assert_eq!(round_role(3, 1, 5), Role::Send(2));
        assert_eq!(round_role(4, 1, 5), Role::Idle);
        assert_eq!(round_role(4, 4, 5), Role::Send(0));
        assert_eq!(round_role(0, 4, 5), Role::Receive(4));
        assert_eq!(round_role(2, 2, 3), Role::Send(0));
        assert_eq!(round_role(0, 2, 2), Role::Idle);
    }

    #[test]
    fn test_every_worker_sends_exactly_once() {
        for size in 1..20 {
            let mut sends = vec![0; size];
            let mut receives = 0;
            for stride in strides(size) {
                for rank in 0..size {
                    match round_role(rank, stride, size) {
                        Role::Send(partner) => {
                            assert_eq!(round_role(partner, stride, size), Role::Receive(rank));
                            sends[rank] += 1;
                        }
                        Role::Receive(_) => receives += 1,
                        Role::Idle => {}
                    }
                }
            }
            assert_eq!(sends[0], 0);
            assert!(sends.iter().skip(1).all(|&s| s == 1));
            assert_eq!(receives, size - 1);
        }
    }

    #[test]
    fn test_tree_reduce() {
        let universe = LocalUniverse::new(5).unwrap();
        let results = universe
            .run(|comm| {
                let sorter = sorter();
                let local: Vec<i32> = (0..4).map(|i| (comm.rank() * 10 + i) as i32).collect();
                let top = extract_local_topk(&local, 6, &sorter);
                tree_reduce(comm, top, 6, &mut Timings::default())
            })
            .unwrap();

        assert_eq!(results[0], Some(vec![43, 42, 41, 40, 33, 32]));
        assert!(results[1..].iter().all(Option::is_none));
    }

    #[test]
    fn test_policy() {
        let padded = vec![5, 2, -1, -1];
        assert_eq!(apply_policy(padded.clone(), TopKPolicy::Padded), padded);
        assert_eq!(apply_policy(padded, TopKPolicy::Truncated), vec![5, 2]);
    }
}

//! All-to-all redistribution of buckets to their owning workers
use std::ops::Range;

use log::debug;

use crate::bucket::Buckets;
use crate::comm::displacements;
use crate::traits::Communicator;
use crate::types::Key;

/// Everything a worker received during an exchange.
///
/// The keys are the contributions of every sender, itself included, one after
/// the other in ascending sender rank.
#[derive(Debug, Clone)]
pub struct Exchanged<K> {
    data: Vec<K>,
    counts: Vec<usize>,
}

impl<K: Key> Exchanged<K> {
    /// Number of keys received from each sender
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Index range of one sender's contribution
    pub fn range(&self, sender: usize) -> Range<usize> {
        let start = self.counts[..sender].iter().sum::<usize>();
        start..start + self.counts[sender]
    }

    /// Keys received from `sender`
    pub fn from_sender(&self, sender: usize) -> &[K] {
        &self.data[self.range(sender)]
    }

    /// All received keys
    pub fn as_slice(&self) -> &[K] {
        &self.data
    }

    /// Take the received keys as the new local working set
    pub fn into_inner(self) -> Vec<K> {
        self.data
    }
}

/// Route every bucket to its destination worker.
///
/// Counts travel first so every receiver can size its buffer, then all keys
/// move in one variable-count all-to-all. Must be entered by every worker.
pub fn redistribute<C: Communicator, K: Key>(comm: &C, buckets: Buckets<K>) -> Exchanged<K> {
    let recv_counts = comm.all_to_all_counts(buckets.counts());
    debug!(
        "rank {}: sending {:?} ({} keys), receiving {:?}, send offsets {:?}",
        comm.rank(),
        buckets.counts(),
        buckets.len(),
        recv_counts,
        displacements(buckets.counts())
    );
    let data = comm.all_to_all_varcount(buckets.as_slice(), buckets.counts(), &recv_counts);
    Exchanged {
        data,
        counts: recv_counts,
    }
}

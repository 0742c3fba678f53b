//! Collecting the sorted shards on the coordinator
use std::ops::Range;

use log::debug;

use crate::comm::displacements;
use crate::traits::Communicator;
use crate::types::{Key, ROOT};

/// The concatenation of every worker's sorted keys, in rank order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gathered<K> {
    data: Vec<K>,
    counts: Vec<usize>,
}

impl<K: Key> Gathered<K> {
    /// Number of keys contributed by each worker
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Index ranges of the contributions of each worker
    pub fn segments(&self) -> Vec<Range<usize>> {
        displacements(&self.counts)
            .into_iter()
            .zip(&self.counts)
            .map(|(start, &count)| start..start + count)
            .collect()
    }

    /// Keys contributed by `rank`
    pub fn segment(&self, rank: usize) -> &[K] {
        let start = self.counts[..rank].iter().sum::<usize>();
        &self.data[start..start + self.counts[rank]]
    }

    /// All gathered keys
    pub fn as_slice(&self) -> &[K] {
        &self.data
    }

    /// Take the gathered keys
    pub fn into_inner(self) -> Vec<K> {
        self.data
    }
}

/// Collect every worker's `local` keys on the root, lengths first, then the payloads.
///
/// Returns `Some` on the root only.
pub fn gather_sorted<C: Communicator, K: Key>(comm: &C, local: &[K]) -> Option<Gathered<K>> {
    let counts = comm.gather_count(ROOT, local.len());
    let data = comm.gather_varcount(ROOT, local, counts.as_deref())?;
    let counts = counts?;
    debug!("gathered {} keys from {:?}", data.len(), counts);
    Some(Gathered { data, counts })
}

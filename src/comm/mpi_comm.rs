//! MPI fabric
use log::error;
use mpi::{
    datatype::{Partition, PartitionMut},
    topology::SimpleCommunicator,
    traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Destination, Root, Source},
    Count, Rank,
};

use crate::comm::displacements;
use crate::traits::Communicator;
use crate::types::Key;

/// Status reported when a buffer is too large for an MPI count
const COUNT_OVERFLOW_CODE: i32 = 4;

/// Convert element counts to MPI counts; `None` if any of them does not fit
fn checked_counts(counts: &[usize]) -> Option<Vec<Count>> {
    counts.iter().map(|&c| Count::try_from(c).ok()).collect()
}

/// MPI counts, aborting the group when a count is out of range
fn to_counts(comm: &SimpleCommunicator, counts: &[usize]) -> Vec<Count> {
    match checked_counts(counts) {
        Some(counts) => counts,
        None => {
            error!("element counts {counts:?} exceed the MPI count range");
            MpiCommunicator::abort(comm, COUNT_OVERFLOW_CODE)
        }
    }
}

/// MPI displacements of contiguous contributions, aborting the group when out of range
fn to_displs(comm: &SimpleCommunicator, counts: &[usize]) -> Vec<Count> {
    to_counts(comm, &displacements(counts))
}

impl Communicator for SimpleCommunicator {
    fn rank(&self) -> usize {
        MpiCommunicator::rank(self) as usize
    }

    fn size(&self) -> usize {
        MpiCommunicator::size(self) as usize
    }

    fn barrier(&self) {
        CommunicatorCollectives::barrier(self);
    }

    fn all_to_all_counts(&self, send_counts: &[usize]) -> Vec<usize> {
        let counts_snd = to_counts(self, send_counts);
        let mut counts_recv = vec![0 as Count; counts_snd.len()];
        self.all_to_all_into(&counts_snd[..], &mut counts_recv[..]);
        counts_recv.into_iter().map(|c| c as usize).collect()
    }

    fn all_to_all_varcount<K: Key>(
        &self,
        send: &[K],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<K> {
        let total = recv_counts.iter().sum::<usize>();
        let mut received = vec![K::default(); total];

        let counts_snd = to_counts(self, send_counts);
        let counts_recv = to_counts(self, recv_counts);
        let displs_snd = to_displs(self, send_counts);
        let displs_recv = to_displs(self, recv_counts);
        let partition_snd = Partition::new(send, counts_snd, &displs_snd[..]);
        let mut partition_received =
            PartitionMut::new(&mut received[..], counts_recv, &displs_recv[..]);

        self.all_to_all_varcount_into(&partition_snd, &mut partition_received);
        received
    }

    fn scatter_varcount<K: Key>(
        &self,
        root: usize,
        send: Option<&[K]>,
        counts: &[usize],
    ) -> Vec<K> {
        let root_process = self.process_at_rank(root as Rank);
        let mut local = vec![K::default(); counts[Communicator::rank(self)]];

        if Communicator::rank(self) == root {
            let displs = to_displs(self, counts);
            let counts = to_counts(self, counts);
            let partition = Partition::new(send.unwrap_or(&[]), counts, &displs[..]);
            root_process.scatter_varcount_into_root(&partition, &mut local[..]);
        } else {
            root_process.scatter_varcount_into(&mut local[..]);
        }
        local
    }

    fn gather_count(&self, root: usize, count: usize) -> Option<Vec<usize>> {
        let root_process = self.process_at_rank(root as Rank);
        let count = to_counts(self, &[count])[0];

        if Communicator::rank(self) == root {
            let mut counts = vec![0 as Count; Communicator::size(self)];
            root_process.gather_into_root(&count, &mut counts[..]);
            Some(counts.into_iter().map(|c| c as usize).collect())
        } else {
            root_process.gather_into(&count);
            None
        }
    }

    fn gather_varcount<K: Key>(
        &self,
        root: usize,
        send: &[K],
        counts: Option<&[usize]>,
    ) -> Option<Vec<K>> {
        let root_process = self.process_at_rank(root as Rank);

        if Communicator::rank(self) == root {
            let counts = counts.unwrap_or(&[]);
            let displs = to_displs(self, counts);
            let mut gathered = vec![K::default(); counts.iter().sum()];
            let counts = to_counts(self, counts);
            let mut partition = PartitionMut::new(&mut gathered[..], counts, &displs[..]);
            root_process.gather_varcount_into_root(send, &mut partition);
            Some(gathered)
        } else {
            root_process.gather_varcount_into(send);
            None
        }
    }

    fn send<K: Key>(&self, destination: usize, data: &[K]) {
        self.process_at_rank(destination as Rank).send(data);
    }

    fn receive<K: Key>(&self, source: usize, len: usize) -> Vec<K> {
        let mut data = vec![K::default(); len];
        self.process_at_rank(source as Rank)
            .receive_into(&mut data[..]);
        data
    }

    fn abort(&self, code: i32) -> ! {
        MpiCommunicator::abort(self, code)
    }
}

//! In-process fabric: every worker is a thread with its own mailbox.
//!
//! Messages from one sender are consumed in the order they were posted, which
//! is all the collectives below need since every worker enters them in the
//! same order. A message from another sender that arrives early is parked
//! until the worker asks for it.
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};

use crate::comm::displacements;
use crate::traits::Communicator;
use crate::types::{DistSortError, Key, Result};

/// Abort code broadcast on behalf of a worker that panicked
const PANIC_CODE: i32 = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Barrier,
    Release,
    Counts,
    Exchange,
    Scatter,
    GatherCount,
    Gather,
    PointToPoint,
    Abort,
}

enum Payload {
    Empty,
    Count(usize),
    Keys(Box<dyn Any + Send>),
    Abort(i32),
}

struct Envelope {
    source: usize,
    tag: Tag,
    payload: Payload,
}

/// Unwinding payload of a worker leaving because the group was aborted
#[derive(Debug)]
struct GroupAbort(i32);

/// Senders to every mailbox, kept outside the worker so a panic can still be announced
struct AbortHandle {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
}

impl AbortHandle {
    fn broadcast(&self, code: i32) {
        for peer in &self.peers {
            // Peers that already finished have dropped their mailbox
            let _ = peer.send(Envelope {
                source: self.rank,
                tag: Tag::Abort,
                payload: Payload::Abort(code),
            });
        }
    }
}

/// One worker's endpoint of a [`LocalUniverse`]
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    mailbox: Receiver<Envelope>,
    pending: RefCell<Vec<VecDeque<Envelope>>>,
}

impl LocalCommunicator {
    fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            rank: self.rank,
            peers: self.peers.clone(),
        }
    }

    fn post(&self, destination: usize, tag: Tag, payload: Payload) {
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload,
        };
        if self.peers[destination].send(envelope).is_err() {
            panic!("rank {}: worker {destination} has left the group", self.rank);
        }
    }

    fn post_keys<K: Key>(&self, destination: usize, tag: Tag, data: &[K]) {
        self.post(destination, tag, Payload::Keys(Box::new(data.to_vec())));
    }

    /// Block until the next message from `source` is available
    fn take(&self, source: usize, tag: Tag) -> Payload {
        let parked = self.pending.borrow_mut()[source].pop_front();
        let envelope = match parked {
            Some(envelope) => envelope,
            None => loop {
                let Ok(envelope) = self.mailbox.recv() else {
                    panic!("rank {}: mailbox disconnected", self.rank);
                };
                if let Payload::Abort(code) = &envelope.payload {
                    panic::panic_any(GroupAbort(*code));
                }
                if envelope.source == source {
                    break envelope;
                }
                self.pending.borrow_mut()[envelope.source].push_back(envelope);
            },
        };
        assert_eq!(
            envelope.tag, tag,
            "rank {}: out of order message from worker {}",
            self.rank, source
        );
        envelope.payload
    }

    fn take_count(&self, source: usize, tag: Tag) -> usize {
        match self.take(source, tag) {
            Payload::Count(count) => count,
            _ => panic!("expected a count from worker {source}"),
        }
    }

    fn take_keys<K: Key>(&self, source: usize, tag: Tag) -> Vec<K> {
        match self.take(source, tag) {
            Payload::Keys(data) => match data.downcast::<Vec<K>>() {
                Ok(data) => *data,
                Err(_) => panic!("key type mismatch with worker {source}"),
            },
            _ => panic!("expected keys from worker {source}"),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn barrier(&self) {
        let size = self.size();
        if self.rank == 0 {
            for source in 1..size {
                self.take(source, Tag::Barrier);
            }
            for destination in 1..size {
                self.post(destination, Tag::Release, Payload::Empty);
            }
        } else {
            self.post(0, Tag::Barrier, Payload::Empty);
            self.take(0, Tag::Release);
        }
    }

    fn all_to_all_counts(&self, send_counts: &[usize]) -> Vec<usize> {
        for (destination, &count) in send_counts.iter().enumerate() {
            self.post(destination, Tag::Counts, Payload::Count(count));
        }
        (0..self.size())
            .map(|source| self.take_count(source, Tag::Counts))
            .collect()
    }

    fn all_to_all_varcount<K: Key>(
        &self,
        send: &[K],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<K> {
        let displs = displacements(send_counts);
        for (destination, (&displ, &count)) in displs.iter().zip(send_counts).enumerate() {
            self.post_keys(destination, Tag::Exchange, &send[displ..displ + count]);
        }

        let mut received = Vec::with_capacity(recv_counts.iter().sum());
        for (source, &count) in recv_counts.iter().enumerate() {
            let part = self.take_keys::<K>(source, Tag::Exchange);
            assert_eq!(part.len(), count, "short exchange from worker {source}");
            received.extend(part);
        }
        received
    }

    fn scatter_varcount<K: Key>(
        &self,
        root: usize,
        send: Option<&[K]>,
        counts: &[usize],
    ) -> Vec<K> {
        if self.rank == root {
            let data = send.unwrap_or(&[]);
            let displs = displacements(counts);
            for (destination, (&displ, &count)) in displs.iter().zip(counts).enumerate() {
                self.post_keys(destination, Tag::Scatter, &data[displ..displ + count]);
            }
        }
        self.take_keys(root, Tag::Scatter)
    }

    fn gather_count(&self, root: usize, count: usize) -> Option<Vec<usize>> {
        self.post(root, Tag::GatherCount, Payload::Count(count));
        if self.rank != root {
            return None;
        }
        Some(
            (0..self.size())
                .map(|source| self.take_count(source, Tag::GatherCount))
                .collect(),
        )
    }

    fn gather_varcount<K: Key>(
        &self,
        root: usize,
        send: &[K],
        counts: Option<&[usize]>,
    ) -> Option<Vec<K>> {
        self.post_keys(root, Tag::Gather, send);
        if self.rank != root {
            return None;
        }
        let mut gathered = Vec::with_capacity(counts.map_or(0, |c| c.iter().sum()));
        for source in 0..self.size() {
            let part = self.take_keys::<K>(source, Tag::Gather);
            if let Some(counts) = counts {
                assert_eq!(part.len(), counts[source], "short gather from {source}");
            }
            gathered.extend(part);
        }
        Some(gathered)
    }

    fn send<K: Key>(&self, destination: usize, data: &[K]) {
        self.post_keys(destination, Tag::PointToPoint, data);
    }

    fn receive<K: Key>(&self, source: usize, len: usize) -> Vec<K> {
        let data = self.take_keys::<K>(source, Tag::PointToPoint);
        assert_eq!(data.len(), len, "short message from worker {source}");
        data
    }

    fn abort(&self, code: i32) -> ! {
        error!("rank {}: aborting group with code {code}", self.rank);
        self.abort_handle().broadcast(code);
        panic::panic_any(GroupAbort(code))
    }
}

/// A group of workers running as threads of the current process
pub struct LocalUniverse {
    size: usize,
}

impl LocalUniverse {
    /// Create a group of `size` workers
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(DistSortError::InvalidPartition(
                "a worker group needs at least one worker".to_string(),
            ));
        }
        Ok(Self { size })
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wire up one communicator per worker
    pub fn communicators(&self) -> Vec<LocalCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, mailbox)| LocalCommunicator {
                rank,
                peers: senders.clone(),
                mailbox,
                pending: RefCell::new((0..self.size).map(|_| VecDeque::new()).collect()),
            })
            .collect()
    }

    /// Run `worker` on every rank concurrently and collect the results in rank order.
    ///
    /// A panicking worker aborts the group, so its peers never stall on it.
    pub fn run<R, F>(&self, worker: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&LocalCommunicator) -> R + Sync,
    {
        debug!("launching {} local workers", self.size);
        let worker = &worker;
        // Endpoints come back from their threads and are only dropped once every
        // worker is done, so no mailbox disappears under a peer still posting to it
        let mut endpoints = Vec::with_capacity(self.size);
        let outcomes: Vec<thread::Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .communicators()
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(&comm)));
                        if let Err(payload) = &outcome {
                            if payload.downcast_ref::<GroupAbort>().is_none() {
                                error!("rank {}: worker panicked, aborting group", comm.rank);
                                comm.abort_handle().broadcast(PANIC_CODE);
                            }
                        }
                        (outcome, comm)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok((outcome, comm)) => {
                        endpoints.push(comm);
                        outcome
                    }
                    Err(payload) => Err(payload),
                })
                .collect()
        });
        drop(endpoints);

        let mut results = Vec::with_capacity(self.size);
        let mut aborted = None;
        let mut panicked = None;
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(payload) => match payload.downcast_ref::<GroupAbort>() {
                    Some(GroupAbort(code)) => {
                        aborted.get_or_insert(*code);
                    }
                    None => {
                        panicked.get_or_insert(rank);
                    }
                },
            }
        }

        if let Some(rank) = panicked {
            return Err(DistSortError::WorkerPanicked(rank));
        }
        if let Some(code) = aborted {
            return Err(DistSortError::Aborted(code));
        }
        Ok(results)
    }
}

//! Trait definitions
use crate::types::Key;

/// The blocking communication fabric connecting the workers.
///
/// Every method is a synchronous call: it returns once this worker's part of
/// the operation is complete. Collective methods must be entered by every
/// worker of the group in the same program order.
pub trait Communicator {
    /// Rank of this worker
    fn rank(&self) -> usize;

    /// Number of workers in the group
    fn size(&self) -> usize;

    /// Check if this worker is the given root
    fn is_rank(&self, root: usize) -> bool {
        self.rank() == root
    }

    /// Block until every worker has entered the barrier
    fn barrier(&self);

    /// Send `send_counts[i]` to worker `i`; return the count received from every worker
    fn all_to_all_counts(&self, send_counts: &[usize]) -> Vec<usize>;

    /// Variable-count all-to-all.
    ///
    /// `send` holds the data for worker 0, then worker 1, and so on, with
    /// `send_counts[i]` elements for worker `i`. The result is the
    /// concatenation of the contributions of every sender in ascending rank
    /// order, with `recv_counts[i]` elements from worker `i`.
    fn all_to_all_varcount<K: Key>(
        &self,
        send: &[K],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<K>;

    /// Scatter contiguous slices of the root's data, `counts[i]` elements to worker `i`.
    ///
    /// `send` is only read on the root.
    fn scatter_varcount<K: Key>(&self, root: usize, send: Option<&[K]>, counts: &[usize])
        -> Vec<K>;

    /// Gather one count from every worker; `Some` on the root only
    fn gather_count(&self, root: usize, count: usize) -> Option<Vec<usize>>;

    /// Gather variable-size contributions in rank order; `Some` on the root only.
    ///
    /// `counts` must be given on the root.
    fn gather_varcount<K: Key>(
        &self,
        root: usize,
        send: &[K],
        counts: Option<&[usize]>,
    ) -> Option<Vec<K>>;

    /// Point-to-point send
    fn send<K: Key>(&self, destination: usize, data: &[K]);

    /// Point-to-point receive of `len` elements
    fn receive<K: Key>(&self, source: usize, len: usize) -> Vec<K>;

    /// Bring down the whole group
    fn abort(&self, code: i32) -> !;
}

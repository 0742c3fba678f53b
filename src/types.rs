//! Type definitions.
use std::fmt::Debug;

#[cfg(feature = "mpi")]
use mpi::datatype::Equivalence;
use num::{PrimInt, Signed};
use thiserror::Error;

/// Rank of the coordinator worker
pub const ROOT: usize = 0;

/// Exclusive upper bound of generated keys unless configured otherwise
pub const DEFAULT_MAX_VALUE: i64 = 1_000_000;

/// A fixed-width signed integer key that can be sorted and moved between workers.
#[cfg(not(feature = "mpi"))]
pub trait Key: PrimInt + Signed + Default + Debug + Send + Sync + 'static {}

/// A fixed-width signed integer key that can be sorted and moved between workers.
#[cfg(feature = "mpi")]
pub trait Key: PrimInt + Signed + Default + Debug + Send + Sync + Equivalence + 'static {}

impl Key for i16 {}
impl Key for i32 {}
impl Key for i64 {}

/// The out-of-domain value padding a top-K list when too little data exists.
pub fn sentinel<K: Key>() -> K {
    -K::one()
}

/// Errors raised by the sorting pipeline
#[derive(Debug, Error)]
pub enum DistSortError {
    /// The coordinator could not reserve memory for the global array
    #[error("failed to allocate {requested} elements for the global array")]
    Allocation {
        /// Number of elements requested
        requested: usize,
    },
    /// K is zero, or larger than the array in a mode that does not clamp
    #[error("k ({k}) must be between 1 and the array size ({n})")]
    InvalidK {
        /// Requested K
        k: usize,
        /// Global array size
        n: usize,
    },
    /// The partitioner was built with no partitions or an empty domain
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    /// A worker thread pool could not be built
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// The communication fabric could not be brought up
    #[error("communication fabric unavailable: {0}")]
    Fabric(String),
    /// The worker group was aborted
    #[error("worker group aborted with code {0}")]
    Aborted(i32),
    /// A worker panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, DistSortError>;

/// Direction of a local sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl SortOrder {
    /// Check that `a` may precede `b`
    pub fn in_order<K: Ord>(self, a: &K, b: &K) -> bool {
        match self {
            SortOrder::Ascending => a <= b,
            SortOrder::Descending => a >= b,
        }
    }
}

/// How the chunked parallel sort resolves order across chunk boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMerge {
    /// One more sort over the full buffer
    Resort,
    /// Explicit k-way merge of the sorted chunks
    KWayMerge,
}

/// What to return when the whole group holds fewer than K real values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKPolicy {
    /// Keep exactly K slots, trailing ones holding the sentinel
    Padded,
    /// Drop trailing sentinels, returning fewer than K values
    Truncated,
}

/// Strategy used to compute the global top-K
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKMode {
    /// Extract per shard, then merge along a binary tree
    TreeReduce,
    /// Bucketize and exchange by value range first, then extract and tree merge
    Bucketed,
    /// Extract per shard, gather every partial list to the coordinator and sort there
    Gather,
}

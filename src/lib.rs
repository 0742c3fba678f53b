//! Distributed bucket sort and top-K extraction
//!
//! A fixed group of workers cooperates to either fully sort a global array of
//! integer keys or to extract its K largest values. The pipeline is
//! distribute, bucketize by value range, exchange, order locally, then either
//! gather the sorted shards or merge the partial top-K lists along a binary
//! tree.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod bucket;
pub mod comm;
pub mod distribute;
pub mod exchange;
pub mod gather;
pub mod generation;
pub mod oracle;
pub mod ordering;
pub mod partition;
pub mod pipeline;
pub mod report;
pub mod timing;
pub mod topk;
pub mod traits;
pub mod types;

pub use pipeline::{bucket_sort, top_k, PipelineOptions, SortOutcome, TopKOutcome};
pub use types::{DistSortError, Key, Result};

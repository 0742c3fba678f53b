//! Random workloads
use log::{error, info};
use num::NumCast;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
    ThreadPool,
};

use crate::traits::Communicator;
use crate::types::{DistSortError, Key, Result, ROOT};

/// Keys generated from one seed; blocks are filled in parallel
const BLOCK_SIZE: usize = 1 << 16;

/// Status reported by every worker when the coordinator cannot hold the global array
pub const ALLOCATION_FAILURE_CODE: i32 = 1;

/// `n` keys drawn uniformly from `[0, max_value)`.
///
/// Block `b` of the output is drawn from a generator seeded with `seed + b`,
/// so the array depends on `seed` only, not on the number of threads.
pub fn random_array<K: Key>(
    n: usize,
    max_value: i64,
    seed: u64,
    pool: &ThreadPool,
) -> Result<Vec<K>> {
    if max_value <= 0 || <K as NumCast>::from(max_value).is_none() {
        return Err(DistSortError::InvalidPartition(format!(
            "cannot draw keys from [0, {max_value})"
        )));
    }

    let mut data = Vec::new();
    data.try_reserve_exact(n)
        .map_err(|_| DistSortError::Allocation { requested: n })?;
    data.resize(n, K::zero());

    pool.install(|| {
        data.par_chunks_mut(BLOCK_SIZE)
            .enumerate()
            .for_each(|(block, chunk)| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(block as u64));
                for value in chunk.iter_mut() {
                    *value = <K as NumCast>::from(rng.gen_range(0..max_value)).unwrap_or_default();
                }
            })
    });
    Ok(data)
}

/// Generate the global array on the root.
///
/// A failure on the root brings down the whole group; other workers get `None`.
pub fn coordinator_array<C: Communicator, K: Key>(
    comm: &C,
    n: usize,
    max_value: i64,
    seed: u64,
    pool: &ThreadPool,
) -> Option<Vec<K>> {
    if !comm.is_rank(ROOT) {
        return None;
    }
    match random_array(n, max_value, seed, pool) {
        Ok(data) => {
            info!("generated {n} keys in [0, {max_value}) with seed {seed}");
            Some(data)
        }
        Err(e) => {
            error!("cannot create the global array: {e}");
            comm.abort(ALLOCATION_FAILURE_CODE)
        }
    }
}

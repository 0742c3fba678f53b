//? mpirun -n {{NPROCESSES}} --features "mpi"

#[cfg(feature = "mpi")]
use distsort::{
    bucket_sort,
    generation::coordinator_array,
    top_k,
    types::{TopKMode, ROOT},
    PipelineOptions,
};
#[cfg(feature = "mpi")]
use mpi::{environment::Universe, topology::SimpleCommunicator};
#[cfg(feature = "mpi")]
use rayon::ThreadPoolBuilder;

#[cfg(feature = "mpi")]
fn test_parallel_bucket_sort(world: &SimpleCommunicator, n: usize) {
    let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    let mut options = PipelineOptions::default();
    options.set_num_threads(2);
    options.set_max_value(10_000);

    let input = coordinator_array::<_, i32>(world, n, 10_000, 42, &pool);
    let outcome = bucket_sort(world, input, n, &options).unwrap();

    if let Some(sorted) = outcome.sorted {
        assert_eq!(outcome.rank, ROOT);
        assert_eq!(sorted.as_slice().len(), n);
        assert_eq!(outcome.verified, Some(true));
    }
}

#[cfg(feature = "mpi")]
fn test_parallel_top_k(world: &SimpleCommunicator, n: usize, k: usize, mode: TopKMode) {
    let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    let mut options = PipelineOptions::default();
    options.set_num_threads(2);
    options.set_max_value(10_000);
    options.set_topk_mode(mode);

    let input = coordinator_array::<_, i32>(world, n, 10_000, 7, &pool);
    let outcome = top_k(world, input, n, k, &options).unwrap();

    if let Some(top) = outcome.top {
        assert_eq!(top.len(), k.min(n));
        assert_eq!(outcome.verified, Some(true));
    }
}

#[cfg(feature = "mpi")]
fn main() {
    use mpi::traits::Communicator;

    let universe: Universe = mpi::initialize().unwrap();
    let world = universe.world();
    let rank = world.rank();

    for n in [0, 1, 17, 100_000] {
        if rank == 0 {
            println!("Testing bucket sort of {n} keys in parallel.");
        }
        test_parallel_bucket_sort(&world, n);
    }
    for mode in [TopKMode::TreeReduce, TopKMode::Bucketed, TopKMode::Gather] {
        for (n, k) in [(10, 3), (100_000, 100)] {
            if rank == 0 {
                println!("Testing top-{k} of {n} keys in parallel with {mode:?}.");
            }
            test_parallel_top_k(&world, n, k, mode);
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn main() {}

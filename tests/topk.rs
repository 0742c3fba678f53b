use distsort::comm::LocalUniverse;
use distsort::generation::random_array;
use distsort::oracle::reference_topk;
use distsort::traits::Communicator;
use distsort::types::{DistSortError, TopKMode, TopKPolicy};
use distsort::{top_k, PipelineOptions, TopKOutcome};
use paste::paste;
use rayon::ThreadPoolBuilder;

fn generate(n: usize, max_value: i64, seed: u64) -> Vec<i32> {
    let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    random_array(n, max_value, seed, &pool).unwrap()
}

fn options(mode: TopKMode, threads: usize, max_value: i64) -> PipelineOptions {
    let mut options = PipelineOptions::default();
    options.set_topk_mode(mode);
    options.set_num_threads(threads);
    options.set_max_value(max_value);
    options.set_parallel_threshold(64);
    options
}

fn run_topk(
    input: &[i32],
    k: usize,
    workers: usize,
    options: &PipelineOptions,
) -> Vec<TopKOutcome<i32>> {
    let universe = LocalUniverse::new(workers).unwrap();
    universe
        .run(|comm| {
            let data = comm.is_rank(0).then(|| input.to_vec());
            top_k(comm, data, input.len(), k, options).unwrap()
        })
        .unwrap()
}

fn check_topk(mode: TopKMode, n: usize, k: usize, workers: usize, threads: usize) {
    let input = generate(n, 1_000, 3 + n as u64);
    let options = options(mode, threads, 1_000);
    let outcomes = run_topk(&input, k, workers, &options);

    let root = &outcomes[0];
    assert_eq!(root.k, k);
    assert_eq!(root.verified, Some(true));
    assert_eq!(
        root.top.as_deref(),
        Some(reference_topk(&input, k, TopKPolicy::Padded).as_slice())
    );
    for outcome in &outcomes[1..] {
        assert!(outcome.top.is_none());
        assert_eq!(outcome.k, k);
    }
}

macro_rules! test_topk {
    ($(($n:literal, $k:literal, $workers:literal, $threads:literal)),+) => {
        $(
            paste! {
                #[test]
                fn [<test_tree_topk_ $k _of_ $n _on_ $workers _workers_ $threads _threads>]() {
                    check_topk(TopKMode::TreeReduce, $n, $k, $workers, $threads);
                }
                #[test]
                fn [<test_bucketed_topk_ $k _of_ $n _on_ $workers _workers_ $threads _threads>]() {
                    check_topk(TopKMode::Bucketed, $n, $k, $workers, $threads);
                }
                #[test]
                fn [<test_gather_topk_ $k _of_ $n _on_ $workers _workers_ $threads _threads>]() {
                    check_topk(TopKMode::Gather, $n, $k, $workers, $threads);
                }
            }
        )*
    };
}

test_topk!(
    (1, 1, 1, 1),
    (10, 3, 2, 2),
    (10, 10, 4, 1),
    (1000, 1, 3, 2),
    (1000, 100, 5, 2),
    (5000, 250, 8, 3),
    (20000, 64, 6, 4)
);

#[test]
fn test_clamped_k() {
    let input = generate(7, 100, 1);
    for mode in [TopKMode::TreeReduce, TopKMode::Bucketed] {
        let outcomes = run_topk(&input, 20, 3, &options(mode, 2, 100));
        let root = &outcomes[0];
        assert_eq!(root.k, 7);
        let mut expected = input.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(root.top.as_deref(), Some(expected.as_slice()));
        assert_eq!(root.verified, Some(true));
    }
}

#[test]
fn test_rejected_k() {
    let input = generate(7, 100, 1);
    let universe = LocalUniverse::new(3).unwrap();

    // Gather never clamps; K = 0 is rejected by every mode
    for (mode, k) in [
        (TopKMode::Gather, 20),
        (TopKMode::Gather, 0),
        (TopKMode::TreeReduce, 0),
    ] {
        let options = options(mode, 1, 100);
        let results = universe
            .run(|comm| {
                let data = comm.is_rank(0).then(|| input.clone());
                top_k(comm, data, input.len(), k, &options).map(|o| o.k)
            })
            .unwrap();
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(DistSortError::InvalidK { .. }))));
    }
}

#[test]
fn test_sparse_workers_pad_with_sentinel() {
    // Every key lands on one worker after the range exchange, which holds fewer than K
    let input = vec![3, 1, 2];
    let outcomes = run_topk(&input, 3, 4, &options(TopKMode::Bucketed, 1, 1_000));
    assert_eq!(outcomes[0].top, Some(vec![3, 2, 1]));

    // More workers than keys leaves some shards empty
    let outcomes = run_topk(&input, 3, 6, &options(TopKMode::TreeReduce, 1, 1_000));
    assert_eq!(outcomes[0].top, Some(vec![3, 2, 1]));
}

#[test]
fn test_truncated_policy_keeps_real_keys() {
    // Zero is the smallest real key and must survive sentinel trimming
    let input = vec![0, 5, 0, 2];
    for mode in [TopKMode::TreeReduce, TopKMode::Bucketed, TopKMode::Gather] {
        let mut options = options(mode, 1, 10);
        options.set_topk_policy(TopKPolicy::Truncated);
        let outcomes = run_topk(&input, 4, 3, &options);
        assert_eq!(outcomes[0].top, Some(vec![5, 2, 0, 0]));
        assert_eq!(outcomes[0].verified, Some(true));
    }
}

#[test]
fn test_negative_keys_abort() {
    for mode in [TopKMode::TreeReduce, TopKMode::Bucketed, TopKMode::Gather] {
        let universe = LocalUniverse::new(3).unwrap();
        let options = options(mode, 1, 10);
        let result = universe.run(|comm| {
            let input = comm.is_rank(0).then(|| vec![-1i32, -5, 3]);
            top_k(comm, input, 3, 3, &options).map(|o| o.top)
        });
        assert!(matches!(result, Err(DistSortError::Aborted(3))));
    }
}

#[test]
fn test_modes_agree() {
    let input = generate(12_345, 50, 99);
    let mut results = vec![];
    for mode in [TopKMode::TreeReduce, TopKMode::Bucketed, TopKMode::Gather] {
        for workers in [1, 3, 4] {
            let mut outcomes = run_topk(&input, 500, workers, &options(mode, 2, 50));
            results.push(outcomes.swap_remove(0).top.unwrap());
        }
    }
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
}

//! Run the distributed bucket sort or top-K on generated data
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::error;
use rayon::ThreadPoolBuilder;

use distsort::comm::LocalUniverse;
use distsort::generation::coordinator_array;
use distsort::pipeline::effective_k;
use distsort::report::Report;
use distsort::traits::Communicator;
use distsort::types::{ChunkMerge, TopKMode, TopKPolicy, DEFAULT_MAX_VALUE, ROOT};
use distsort::{bucket_sort, top_k, DistSortError, PipelineOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MergeArg {
    /// Sort the whole buffer again after the chunk sorts
    Resort,
    /// Merge the sorted chunks
    Kway,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Local extraction on each shard, then a tree merge
    Tree,
    /// Range exchange first, then local extraction and a tree merge
    Bucketed,
    /// Local extraction, then gather and sort on the coordinator
    Gather,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of in-process workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Use the MPI world instead of in-process workers
    #[cfg(feature = "mpi")]
    #[arg(long, default_value_t = false)]
    mpi: bool,

    /// Exclusive upper bound of the generated keys
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE)]
    max_value: i64,

    /// Seed of the generated array
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// How the parallel local sort resolves chunk boundaries
    #[arg(long, value_enum, default_value_t = MergeArg::Kway)]
    merge: MergeArg,

    /// Skip the check against a sequential sort
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sort the whole array
    Sort {
        /// Array size
        #[arg(default_value_t = 1_000_000)]
        n: usize,
        /// Threads per worker
        #[arg(default_value_t = 4)]
        threads: usize,
    },
    /// Extract the K largest keys
    Topk {
        /// Array size
        #[arg(default_value_t = 1_000_000)]
        n: usize,
        /// Number of keys to extract
        #[arg(default_value_t = 100)]
        k: usize,
        /// Threads per worker
        #[arg(default_value_t = 4)]
        threads: usize,
        /// Top-K strategy
        #[arg(long, value_enum, default_value_t = ModeArg::Bucketed)]
        mode: ModeArg,
        /// Return fewer than K keys instead of padding when data is short
        #[arg(long, default_value_t = false)]
        truncate: bool,
    },
}

impl Cli {
    fn threads(&self) -> usize {
        match self.command {
            Command::Sort { threads, .. } | Command::Topk { threads, .. } => threads,
        }
    }

    fn options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.set_num_threads(self.threads());
        options.set_max_value(self.max_value);
        options.set_verify(!self.no_verify);
        options.set_chunk_merge(match self.merge {
            MergeArg::Resort => ChunkMerge::Resort,
            MergeArg::Kway => ChunkMerge::KWayMerge,
        });
        if let Command::Topk { mode, truncate, .. } = self.command {
            options.set_topk_mode(match mode {
                ModeArg::Tree => TopKMode::TreeReduce,
                ModeArg::Bucketed => TopKMode::Bucketed,
                ModeArg::Gather => TopKMode::Gather,
            });
            if truncate {
                options.set_topk_policy(TopKPolicy::Truncated);
            }
        }
        options
    }
}

/// Everything one worker does; the coordinator returns its report
fn run_worker<C: Communicator>(comm: &C, cli: &Cli) -> Result<Option<Report>, DistSortError> {
    let options = cli.options();
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.num_threads().max(1))
        .build()?;

    let (n, k) = match cli.command {
        Command::Sort { n, .. } => (n, None),
        Command::Topk { n, k, .. } => (n, Some(k)),
    };

    let (k, verified, timings) = match k {
        None => {
            let input = coordinator_array::<_, i32>(comm, n, cli.max_value, cli.seed, &pool);
            let outcome = bucket_sort(comm, input, n, &options)?;
            (None, outcome.verified, outcome.timings)
        }
        Some(k) => {
            // An unusable K stops every worker before any data is generated
            effective_k(n, k, options.topk_mode(), false)?;
            let input = coordinator_array::<_, i32>(comm, n, cli.max_value, cli.seed, &pool);
            let outcome = top_k(comm, input, n, k, &options)?;
            if let Some(top) = &outcome.top {
                let head = &top[..top.len().min(10)];
                println!("Top {} keys: {:?}", head.len(), head);
            }
            (Some(outcome.k), outcome.verified, outcome.timings)
        }
    };

    Ok(comm.is_rank(ROOT).then(|| Report {
        workers: comm.size(),
        threads: options.num_threads(),
        n,
        k,
        verified,
        timings,
    }))
}

#[cfg(feature = "mpi")]
fn launch_mpi(cli: &Cli) -> Result<(), DistSortError> {
    use log::warn;
    use mpi::Threading;

    let Some((universe, threading)) = mpi::initialize_with_threading(Threading::Funneled) else {
        return Err(DistSortError::Fabric("MPI is already initialized".into()));
    };
    if threading == Threading::Single {
        warn!("MPI does not provide the requested thread support");
    }
    let world = universe.world();
    if let Some(report) = run_worker(&world, cli)? {
        println!("{report}");
    }
    Ok(())
}

fn launch(cli: &Cli) -> Result<(), DistSortError> {
    #[cfg(feature = "mpi")]
    if cli.mpi {
        return launch_mpi(cli);
    }

    let universe = LocalUniverse::new(cli.workers)?;
    for report in universe.run(|comm| run_worker(comm, cli))? {
        if let Some(report) = report? {
            println!("{report}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match launch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(DistSortError::Aborted(code)) => {
            error!("run aborted");
            ExitCode::from(code.clamp(1, 255) as u8)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

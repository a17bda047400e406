use std::{
    num::NonZeroUsize,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use cog_range::{BlockIndex, Location, SourceConfig};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::{
    engines::{setup_engine, Engine, EngineKind, Expectations, Job, Outcome},
    report,
    results::{self, FailedRead, RunParams, RunResult},
    stats::{spawn_monitor, ProgressSummary, StatsState},
    RunArgs,
};

/// Settings shared by the warmup and the measured pass.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub(crate) nthreads: NonZeroUsize,
    pub(crate) engine: EngineKind,
    pub(crate) band: u16,
    pub(crate) block: BlockIndex,
    pub(crate) expect: Expectations,
    pub(crate) warmup: bool,
    pub(crate) header_bytes: u64,
}

pub(crate) struct Benchmark {
    pub(crate) result: RunResult,
    /// Block bytes per URL, `None` where the read failed.
    pub(crate) chunks: Vec<Option<Bytes>>,
}

struct Execution {
    outcomes: Vec<(usize, Outcome)>,
    client_run_times: Vec<Duration>,
    progress: Vec<ProgressSummary>,
    wall: Duration,
}

pub(crate) fn run_main(args: RunArgs, source: SourceConfig) -> anyhow::Result<()> {
    let files = slurp_lines(&args.url_file)?;
    if files.is_empty() {
        bail!("{}: no urls", args.url_file.display());
    }
    let urls = files
        .iter()
        .map(|s| Location::parse(s).with_context(|| format!("invalid url {s:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    println!("{}", file_summary(&files));

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || {
            info!("ctrl-c, setting stop flag");
            if stop.fetch_or(true, Ordering::Relaxed) {
                error!("stop flag was already set, aborting");
                std::process::abort();
            } else {
                info!("first ctrl-c, stop flag set");
            }
        }
    })?;

    let options = RunOptions {
        nthreads: args.threads,
        engine: args.engine,
        band: args.band,
        block: args.block,
        expect: Expectations {
            block_shape: args.block_shape,
            dtype: args.dtype,
        },
        warmup: args.warmup(),
        header_bytes: source.header_bytes,
    };
    let engine = setup_engine(args.engine, args.threads, source)?;
    let Benchmark { result, chunks } = benchmark(engine.as_ref(), &urls, &options, &stop)?;

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create {}", args.output_dir.display()))?;
    let paths = results::next_result_paths(&args.output_dir, &args.prefix, &result.params)
        .ok_or_else(|| anyhow!("no free results file name in {}", args.output_dir.display()))?;
    results::save(&paths.json, &result)?;
    println!("Saved results to:\n    - {}", paths.json.display());
    if args.save_chunks {
        let data: Vec<u8> = chunks.iter().flatten().flat_map(|c| c.iter().copied()).collect();
        std::fs::write(&paths.chunks, data)
            .with_context(|| format!("write {}", paths.chunks.display()))?;
        println!("    - {}", paths.chunks.display());
    }

    let name = paths
        .json
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!(
        "{}",
        report::gen_stats_report(&report::unpack(&result, name), None)
    );
    Ok(())
}

/// Non-empty lines, trimmed.
pub(crate) fn slurp_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

/// First 3 and last 2 urls.
fn file_summary(files: &[String]) -> String {
    let mut out = format!("Files: {}\n", files.len());
    if files.len() <= 5 {
        out.push_str(&files.iter().map(|f| format!("  {f}")).join("\n"));
    } else {
        let head = files[..3].iter().map(|f| format!("  {f}")).join("\n");
        let tail = files[files.len() - 2..]
            .iter()
            .map(|f| format!("  {f}"))
            .join("\n");
        out.push_str(&format!("{head}\n  ...\n{tail}"));
    }
    out
}

/// Read every url once, after an optional warmup over the last
/// `min(urls, nthreads)` of them.
pub(crate) fn benchmark(
    engine: &dyn Engine,
    urls: &[Location],
    options: &RunOptions,
    stop: &Arc<AtomicBool>,
) -> anyhow::Result<Benchmark> {
    let warmup = if options.warmup {
        let n = urls.len().min(options.nthreads.get());
        info!("will read {n} files for warmup first");
        let warm_urls = &urls[urls.len() - n..];
        let execution = execute(engine, warm_urls, options, stop)?;
        info!("warmup done in {:.3} seconds", execution.wall.as_secs_f64());
        Some(assemble(execution, warm_urls, options).result)
    } else {
        None
    };

    info!("reading {} files with {} clients", urls.len(), options.nthreads);
    let execution = execute(engine, urls, options, stop)?;
    let mut benchmark = assemble(execution, urls, options);
    benchmark.result.warmup = warmup.map(Box::new);
    if stop.load(Ordering::Relaxed) {
        warn!("stopped early, unread files are recorded as failed");
    }
    Ok(benchmark)
}

fn execute(
    engine: &dyn Engine,
    urls: &[Location],
    options: &RunOptions,
    stop: &Arc<AtomicBool>,
) -> anyhow::Result<Execution> {
    let clients = options.nthreads.get();
    let job = Arc::new(Job::new(
        urls.to_vec(),
        options.band,
        options.block,
        options.expect,
        clients,
    ));
    let stats_state = Arc::new(StatsState::new(clients));
    let clients_ready = Arc::new(tokio::sync::Barrier::new(clients + 1));
    let monitor = spawn_monitor(Arc::clone(&stats_state), Arc::clone(&clients_ready))?;

    let start = Instant::now();
    let res = engine.run(job, clients_ready, Arc::clone(stop), stats_state);
    let wall = start.elapsed();
    let progress = monitor.finish()?;
    let res = res?;
    Ok(Execution {
        outcomes: res.outcomes,
        client_run_times: res.client_run_times,
        progress,
        wall,
    })
}

fn assemble(execution: Execution, urls: &[Location], options: &RunOptions) -> Benchmark {
    let n = urls.len();
    let mut stats = vec![None; n];
    let mut chunks = vec![None; n];
    let mut errors: Vec<Option<String>> = vec![None; n];
    let mut block_shape = options.expect.block_shape;
    let mut dtype = options.expect.dtype;

    let outcomes = execution
        .outcomes
        .into_iter()
        .sorted_by_key(|(idx, _)| *idx);
    for (idx, outcome) in outcomes {
        match outcome {
            Outcome::Read {
                stat,
                block_shape: shape,
                dtype: sample,
                data,
            } => {
                block_shape.get_or_insert(shape);
                dtype.get_or_insert(sample);
                stats[idx] = Some(stat);
                chunks[idx] = Some(data);
            }
            Outcome::Failed(error) => errors[idx] = Some(error),
        }
    }

    let failures = (0..n)
        .filter(|&i| stats[i].is_none())
        .map(|i| FailedRead {
            index: i,
            url: urls[i].to_string(),
            error: errors[i].take().unwrap_or_else(|| "not attempted".to_owned()),
        })
        .collect();

    let result = RunResult {
        params: RunParams {
            nthreads: options.nthreads.get(),
            engine: options.engine,
            band: options.band,
            block: options.block,
            block_shape,
            dtype,
            header_bytes: options.header_bytes,
            warmup: options.warmup,
        },
        stats,
        failures,
        t_total: execution.wall,
        result_hash: Some(result_hash(&chunks)),
        progress: execution.progress,
        client_run_times: execution.client_run_times,
        warmup: None,
    };
    Benchmark { result, chunks }
}

/// Hex SHA-256 of the blocks in url order.
pub(crate) fn result_hash(chunks: &[Option<Bytes>]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks.iter().flatten() {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

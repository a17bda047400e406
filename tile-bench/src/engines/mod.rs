use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use cog_range::{BlockIndex, BlockRead, BlockShape, BlockingReader, Location, SampleType, SourceConfig};
use tracing::{debug, warn};

use crate::{results::TileStat, stats::StatsState};

pub(crate) mod std_thread;
pub(crate) mod tokio_async;
pub(crate) mod tokio_spawn_blocking;

use std_thread::EngineStd;
use tokio_async::EngineTokioAsync;
use tokio_spawn_blocking::EngineTokioSpawnBlocking;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum EngineKind {
    /// One OS thread per client.
    StdThread,
    /// Async clients handing each read to tokio's blocking pool.
    TokioSpawnBlocking,
    /// Async clients on a multi-thread tokio runtime.
    TokioAsync,
}

impl EngineKind {
    /// Result file prefix used by `suite`.
    pub(crate) fn prefix(&self) -> &'static str {
        match self {
            EngineKind::StdThread => "STD",
            EngineKind::TokioSpawnBlocking => "TSB",
            EngineKind::TokioAsync => "TKA",
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            EngineKind::StdThread => "std-thread",
            EngineKind::TokioSpawnBlocking => "tokio-spawn-blocking",
            EngineKind::TokioAsync => "tokio-async",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) trait Engine {
    /// Run `job` with `job.clients` concurrent clients and return once every
    /// index has been handed out and processed, or `stop` was set.
    fn run(
        &self,
        job: Arc<Job>,
        clients_ready: Arc<tokio::sync::Barrier>,
        stop: Arc<AtomicBool>,
        stats_state: Arc<StatsState>,
    ) -> anyhow::Result<EngineRunResult>;
}

#[derive(Default)]
pub(crate) struct EngineRunResult {
    pub(crate) client_run_times: Vec<Duration>,
    /// `(url index, outcome)`, in no particular order.
    pub(crate) outcomes: Vec<(usize, Outcome)>,
}

impl EngineRunResult {
    pub(crate) fn push_client(&mut self, run_time: Duration, outcomes: Vec<(usize, Outcome)>) {
        self.client_run_times.push(run_time);
        self.outcomes.extend(outcomes);
    }
}

pub(crate) fn setup_engine(
    kind: EngineKind,
    clients: NonZeroUsize,
    source: SourceConfig,
) -> anyhow::Result<Box<dyn Engine>> {
    Ok(match kind {
        EngineKind::StdThread => Box::new(EngineStd::new(source)?),
        EngineKind::TokioSpawnBlocking => Box::new(EngineTokioSpawnBlocking::new(clients, source)?),
        EngineKind::TokioAsync => Box::new(EngineTokioAsync::new(source)?),
    })
}

/// Hands out `0..len`, each index exactly once, until `stop` is set.
pub(crate) struct WorkQueue {
    next: AtomicUsize,
    len: usize,
}

impl WorkQueue {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    pub(crate) fn next(&self, stop: &AtomicBool) -> Option<usize> {
        if stop.load(Ordering::Relaxed) {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        (i < self.len).then_some(i)
    }
}

/// What files that opened must look like to count as read.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Expectations {
    pub(crate) block_shape: Option<BlockShape>,
    pub(crate) dtype: Option<SampleType>,
}

/// Everything the clients of one run share.
pub(crate) struct Job {
    pub(crate) urls: Vec<Location>,
    pub(crate) band: u16,
    pub(crate) block: BlockIndex,
    pub(crate) expect: Expectations,
    pub(crate) clients: usize,
    pub(crate) queue: WorkQueue,
    /// `TileStat::t0` is measured from here.
    pub(crate) start: Instant,
}

impl Job {
    pub(crate) fn new(
        urls: Vec<Location>,
        band: u16,
        block: BlockIndex,
        expect: Expectations,
        clients: usize,
    ) -> Self {
        let queue = WorkQueue::new(urls.len());
        Self {
            urls,
            band,
            block,
            expect,
            clients,
            queue,
            start: Instant::now(),
        }
    }

    /// Turn a reader result for `urls[idx]` into what gets recorded.
    pub(crate) fn outcome(
        &self,
        idx: usize,
        t0: Duration,
        read: cog_range::Result<BlockRead>,
    ) -> Outcome {
        let read = match read {
            Ok(read) => read,
            Err(e) => {
                warn!(url = %self.urls[idx], "read failed: {e}");
                return Outcome::Failed(e.to_string());
            }
        };
        let block_shape = read.layout.block_shape;
        let dtype = read.layout.sample_type;
        if let Some(expected) = self.expect.block_shape.filter(|s| *s != block_shape) {
            warn!(url = %self.urls[idx], "block shape {block_shape}, expected {expected}");
            return Outcome::Failed(format!("block shape {block_shape}, expected {expected}"));
        }
        if let Some(expected) = self.expect.dtype.filter(|d| *d != dtype) {
            warn!(url = %self.urls[idx], "dtype {dtype}, expected {expected}");
            return Outcome::Failed(format!("dtype {dtype}, expected {expected}"));
        }
        Outcome::Read {
            stat: TileStat {
                t0,
                t_open: read.t_open,
                t_total: read.t_total,
                chunk_size: read.data.len() as u64,
                header_fetches: read.open_stats.fetches,
            },
            block_shape,
            dtype,
            data: read.data,
        }
    }
}

pub(crate) enum Outcome {
    Read {
        stat: TileStat,
        block_shape: BlockShape,
        dtype: SampleType,
        data: Bytes,
    },
    Failed(String),
}

impl Outcome {
    pub(crate) fn bytes(&self) -> u64 {
        match self {
            Outcome::Read { stat, .. } => stat.chunk_size,
            Outcome::Failed(_) => 0,
        }
    }
}

/// The client loop of the engines that read with [`BlockingReader`] on the
/// calling thread.
pub(crate) fn client_blocking(
    i: usize,
    job: &Job,
    reader: &BlockingReader,
    stop: &AtomicBool,
    stats_state: &StatsState,
) -> Vec<(usize, Outcome)> {
    debug!("client {i} starting");
    let mut outcomes = Vec::new();
    while let Some(idx) = job.queue.next(stop) {
        let started = Instant::now();
        let t0 = job.start.elapsed();
        let read = reader.read_block(&job.urls[idx], job.band, job.block);
        let outcome = job.outcome(idx, t0, read);
        stats_state.record_op(i, started.elapsed(), outcome.bytes());
        outcomes.push((idx, outcome));
    }
    debug!("client {i} done after {} files", outcomes.len());
    outcomes
}

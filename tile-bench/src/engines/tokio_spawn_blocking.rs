use std::{
    num::NonZeroUsize,
    sync::{atomic::AtomicBool, Arc},
    time::Instant,
};

use cog_range::{BlockingReader, SourceConfig};
use tracing::debug;

use crate::{
    engines::{Engine, EngineRunResult, Job, Outcome},
    stats::StatsState,
};

pub(crate) struct EngineTokioSpawnBlocking {
    rt: tokio::runtime::Runtime,
    reader: Arc<BlockingReader>,
}

impl EngineTokioSpawnBlocking {
    pub(crate) fn new(
        spawn_blocking_pool_size: NonZeroUsize,
        source: SourceConfig,
    ) -> anyhow::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(spawn_blocking_pool_size.get())
            .build()?;
        Ok(Self {
            rt,
            reader: Arc::new(BlockingReader::new(source)?),
        })
    }
}

impl Engine for EngineTokioSpawnBlocking {
    fn run(
        &self,
        job: Arc<Job>,
        clients_ready: Arc<tokio::sync::Barrier>,
        stop: Arc<AtomicBool>,
        stats_state: Arc<StatsState>,
    ) -> anyhow::Result<EngineRunResult> {
        self.rt.block_on(async {
            let mut handles = Vec::with_capacity(job.clients);
            for i in 0..job.clients {
                let job = Arc::clone(&job);
                let reader = Arc::clone(&self.reader);
                let stop = Arc::clone(&stop);
                let stats_state = Arc::clone(&stats_state);
                let clients_ready = Arc::clone(&clients_ready);
                handles.push(tokio::spawn(async move {
                    clients_ready.wait().await;
                    let start = Instant::now();
                    let outcomes = Self::client(i, job, reader, stop, stats_state).await;
                    (start.elapsed(), outcomes)
                }));
            }
            let mut result = EngineRunResult::default();
            for (i, handle) in handles.into_iter().enumerate() {
                debug!("awaiting client {i}");
                let (run_time, outcomes) = handle.await?;
                result.push_client(run_time, outcomes);
            }
            Ok(result)
        })
    }
}

impl EngineTokioSpawnBlocking {
    async fn client(
        i: usize,
        job: Arc<Job>,
        reader: Arc<BlockingReader>,
        stop: Arc<AtomicBool>,
        stats_state: Arc<StatsState>,
    ) -> Vec<(usize, Outcome)> {
        let mut outcomes = Vec::new();
        while let Some(idx) = job.queue.next(&stop) {
            let started = Instant::now();
            let t0 = job.start.elapsed();
            let read = tokio::task::spawn_blocking({
                let job = Arc::clone(&job);
                let reader = Arc::clone(&reader);
                move || reader.read_block(&job.urls[idx], job.band, job.block)
            })
            .await;
            let outcome = match read {
                Ok(read) => job.outcome(idx, t0, read),
                Err(e) => Outcome::Failed(format!("blocking task failed: {e}")),
            };
            stats_state.record_op(i, started.elapsed(), outcome.bytes());
            outcomes.push((idx, outcome));
        }
        outcomes
    }
}

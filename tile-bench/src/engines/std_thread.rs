use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use anyhow::{anyhow, Context};
use cog_range::{BlockingReader, SourceConfig};

use crate::{
    engines::{client_blocking, Engine, EngineRunResult, Job},
    stats::StatsState,
};

pub(crate) struct EngineStd {
    reader: BlockingReader,
}

impl EngineStd {
    pub(crate) fn new(source: SourceConfig) -> anyhow::Result<Self> {
        Ok(Self {
            reader: BlockingReader::new(source)?,
        })
    }
}

/// Stand in at `clients_ready` for `missing` clients that were never started, so
/// the ones already waiting get through. They find `stop` set and exit.
fn release_waiting_clients(clients_ready: &tokio::sync::Barrier, missing: usize, stop: &AtomicBool) {
    stop.store(true, Ordering::Relaxed);
    futures::executor::block_on(futures::future::join_all(
        (0..missing).map(|_| clients_ready.wait()),
    ));
}

impl Engine for EngineStd {
    fn run(
        &self,
        job: Arc<Job>,
        clients_ready: Arc<tokio::sync::Barrier>,
        stop: Arc<AtomicBool>,
        stats_state: Arc<StatsState>,
    ) -> anyhow::Result<EngineRunResult> {
        std::thread::scope(|scope| {
            let mut jhs = Vec::with_capacity(job.clients);
            for i in 0..job.clients {
                let job = &job;
                let stop = &stop;
                let stats_state = &stats_state;
                let reader = &self.reader;
                let client_ready = Arc::clone(&clients_ready);
                let spawned = std::thread::Builder::new()
                    .name(format!("client-{i}"))
                    .spawn_scoped(scope, move || {
                        futures::executor::block_on(client_ready.wait());
                        let start = Instant::now();
                        let outcomes = client_blocking(i, job, reader, stop, stats_state);
                        (start.elapsed(), outcomes)
                    });
                match spawned {
                    Ok(jh) => jhs.push(jh),
                    Err(e) => {
                        release_waiting_clients(&clients_ready, job.clients - i, stop);
                        return Err(e).with_context(|| format!("spawn client {i}"));
                    }
                }
            }
            let mut result = EngineRunResult::default();
            for jh in jhs {
                let (run_time, outcomes) = jh
                    .join()
                    .map_err(|_| anyhow!("client thread panicked"))?;
                result.push_client(run_time, outcomes);
            }
            Ok(result)
        })
    }
}

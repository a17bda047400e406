use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use anyhow::anyhow;
use crossbeam_utils::CachePadded;
use hdrhistogram::{Counter, Histogram};
use itertools::Itertools;
use serde_with::serde_as;
use tracing::{debug, info};

const MONITOR_PERIOD: Duration = Duration::from_secs(1);

const LATENCY_PERCENTILES: [f64; 5] = [50.0, 90.0, 99.0, 99.9, 99.99];

/// Per-client counters the clients bump and the monitor drains.
pub(crate) struct StatsState {
    ops_in_last_second: Vec<CachePadded<AtomicU64>>,
    bytes_in_last_second: Vec<CachePadded<AtomicU64>>,
    latencies_histo: Vec<CachePadded<Mutex<Histogram<u64>>>>,
}

impl StatsState {
    pub(crate) fn new(clients: usize) -> Self {
        Self {
            ops_in_last_second: (0..clients)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            bytes_in_last_second: (0..clients)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            latencies_histo: (0..clients)
                .map(|_| CachePadded::new(Mutex::new(make_latency_histogram())))
                .collect(),
        }
    }

    pub(crate) fn record_op(&self, client: usize, latency: Duration, bytes: u64) {
        self.ops_in_last_second[client].fetch_add(1, Ordering::Relaxed);
        self.bytes_in_last_second[client].fetch_add(bytes, Ordering::Relaxed);
        let mut h = self.latencies_histo[client]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        h.saturating_record(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    fn drain_into(&self, rounds: &mut [&mut AggregatedStats]) {
        for (ops, bytes) in self
            .ops_in_last_second
            .iter()
            .zip(&self.bytes_in_last_second)
        {
            let ops = ops.swap(0, Ordering::Relaxed);
            let bytes = bytes.swap(0, Ordering::Relaxed);
            for round in rounds.iter_mut() {
                round.op_count += ops;
                round.bytes += bytes;
            }
        }
        for h in &self.latencies_histo {
            let mut h = h.lock().unwrap_or_else(PoisonError::into_inner);
            for round in rounds.iter_mut() {
                round.latencies_histo += &*h;
            }
            h.clear();
        }
    }
}

/// Latencies in microseconds, up to an hour.
fn make_latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 3_600_000_000, 3).expect("valid histogram bounds")
}

struct AggregatedStats {
    start: Instant,
    op_count: u64,
    bytes: u64,
    latencies_histo: Histogram<u64>,
}

impl AggregatedStats {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            op_count: 0,
            bytes: 0,
            latencies_histo: make_latency_histogram(),
        }
    }

    fn reset(&mut self, start: Instant) {
        self.start = start;
        self.op_count = 0;
        self.bytes = 0;
        self.latencies_histo.clear();
    }

    fn summary_since_start(&self) -> ProgressSummary {
        let elapsed = self.start.elapsed();
        let elapsed_secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let histo = &self.latencies_histo;
        ProgressSummary {
            elapsed,
            tiles: self.op_count,
            throughput_tps: self.op_count as f64 / elapsed_secs,
            throughput_bw_mibps: self.bytes as f64 / (1 << 20) as f64 / elapsed_secs,
            latency_min_ms: histo.min().as_f64() / 1000.0,
            latency_mean_ms: histo.mean() / 1000.0,
            latency_max_ms: histo.max().as_f64() / 1000.0,
            latency_percentiles: LATENCY_PERCENTILES
                .iter()
                .map(|p| {
                    (
                        format!("p{p}"),
                        histo.value_at_percentile(*p).as_f64() / 1000.0,
                    )
                })
                .collect(),
        }
    }
}

#[serde_as]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub(crate) struct ProgressSummary {
    #[serde_as(as = "serde_with::DurationSecondsWithFrac<f64>")]
    pub(crate) elapsed: Duration,
    pub(crate) tiles: u64,
    pub(crate) throughput_tps: f64,
    /// Block bytes only, headers excluded.
    pub(crate) throughput_bw_mibps: f64,
    pub(crate) latency_min_ms: f64,
    pub(crate) latency_mean_ms: f64,
    pub(crate) latency_max_ms: f64,
    pub(crate) latency_percentiles: BTreeMap<String, f64>,
}

impl std::fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "t{:.2} tiles={} TP: tps={:.1} bw={:.2} LAT(ms): min={:.1} mean={:.1} max={:.1} {}",
            self.elapsed.as_secs_f64(),
            self.tiles,
            self.throughput_tps,
            self.throughput_bw_mibps,
            self.latency_min_ms,
            self.latency_mean_ms,
            self.latency_max_ms,
            LATENCY_PERCENTILES
                .iter()
                .filter_map(|p| {
                    let key = format!("p{p}");
                    self.latency_percentiles
                        .get(&key)
                        .map(|v| format!("{key}={v:.1}"))
                })
                .join(" "),
        )
    }
}

/// Logs progress once a second while a run is going.
pub(crate) struct Monitor {
    handle: std::thread::JoinHandle<Vec<ProgressSummary>>,
    stop_tx: tokio::sync::oneshot::Sender<()>,
}

/// Start the monitor thread. It joins `clients_ready` together with the
/// clients, or gives up waiting once [`Monitor::finish`] is called.
pub(crate) fn spawn_monitor(
    stats_state: Arc<StatsState>,
    clients_ready: Arc<tokio::sync::Barrier>,
) -> anyhow::Result<Monitor> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = std::thread::Builder::new()
        .name("monitor".to_owned())
        .spawn(move || {
            let mut total = AggregatedStats::new();
            let mut this_round = AggregatedStats::new();
            let mut total_summaries = Vec::new();

            let started = rt.block_on(async {
                tokio::select! {
                    biased;
                    _ = clients_ready.wait() => true,
                    _ = &mut stop_rx => false,
                }
            });
            if !started {
                debug!("run ended before clients started");
                return total_summaries;
            }
            total.reset(Instant::now());

            let mut ticker = rt.block_on(async { tokio::time::interval(MONITOR_PERIOD) });
            // first tick completes immediately
            rt.block_on(ticker.tick());

            let mut exit = false;
            while !exit {
                this_round.reset(Instant::now());
                rt.block_on(async {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = &mut stop_rx => {
                            exit = true;
                        }
                    }
                });

                stats_state.drain_into(&mut [&mut this_round, &mut total]);

                let this_round_summary = this_round.summary_since_start();
                let total_summary = total.summary_since_start();
                if !exit {
                    info!("{this_round_summary}");
                }
                info!("total: {total_summary}");
                total_summaries.push(total_summary);
            }
            debug!("monitor shutting down");
            total_summaries
        })?;
    Ok(Monitor { handle, stop_tx })
}

impl Monitor {
    /// Stop the monitor and return the cumulative summary of every round.
    pub(crate) fn finish(self) -> anyhow::Result<Vec<ProgressSummary>> {
        // the monitor may already be gone if the runtime shut down
        let _ = self.stop_tx.send(());
        self.handle
            .join()
            .map_err(|_| anyhow!("monitor thread panicked"))
    }
}

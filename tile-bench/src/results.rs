//! What a run saves, and where.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use cog_range::{BlockIndex, BlockShape, SampleType};
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::{engines::EngineKind, stats::ProgressSummary};

/// Timings of one file. `t0` is relative to the start of the run.
#[serde_as]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct TileStat {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub(crate) t0: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub(crate) t_open: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub(crate) t_total: Duration,
    pub(crate) chunk_size: u64,
    /// Range requests it took to read the header.
    #[serde(default)]
    pub(crate) header_fetches: usize,
}

impl TileStat {
    pub(crate) fn t_read(&self) -> Duration {
        self.t_total.saturating_sub(self.t_open)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct RunParams {
    pub(crate) nthreads: usize,
    pub(crate) engine: EngineKind,
    pub(crate) band: u16,
    pub(crate) block: BlockIndex,
    pub(crate) block_shape: Option<BlockShape>,
    pub(crate) dtype: Option<SampleType>,
    pub(crate) header_bytes: u64,
    pub(crate) warmup: bool,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct FailedRead {
    pub(crate) index: usize,
    pub(crate) url: String,
    pub(crate) error: String,
}

#[serde_as]
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub(crate) struct RunResult {
    pub(crate) params: RunParams,
    /// One entry per URL, in URL order. `None` for files that failed.
    pub(crate) stats: Vec<Option<TileStat>>,
    #[serde(default)]
    pub(crate) failures: Vec<FailedRead>,
    /// Wall time of the whole run.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub(crate) t_total: Duration,
    /// Hex SHA-256 over the block bytes in URL order.
    pub(crate) result_hash: Option<String>,
    #[serde(default)]
    pub(crate) progress: Vec<ProgressSummary>,
    #[serde_as(as = "Vec<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    pub(crate) client_run_times: Vec<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) warmup: Option<Box<RunResult>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResultPaths {
    pub(crate) json: PathBuf,
    pub(crate) chunks: PathBuf,
}

/// `{prefix}_b{x}_{y}B{band}__{nthreads:02}_{n:03}`
pub(crate) fn result_stem(prefix: &str, params: &RunParams, n: usize) -> String {
    format!(
        "{prefix}_b{}_{}B{}__{:02}_{:03}",
        params.block.x, params.block.y, params.band, params.nthreads, n
    )
}

/// First `001`..=`999` name in `dir` with neither file present.
pub(crate) fn next_result_paths(dir: &Path, prefix: &str, params: &RunParams) -> Option<ResultPaths> {
    (1..1000)
        .map(|n| {
            let stem = result_stem(prefix, params, n);
            ResultPaths {
                json: dir.join(format!("{stem}.json")),
                chunks: dir.join(format!("{stem}.chunks")),
            }
        })
        .find(|paths| !paths.json.exists() && !paths.chunks.exists())
}

pub(crate) fn save(path: &Path, result: &RunResult) -> anyhow::Result<()> {
    let json = serde_json::to_string(result)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

pub(crate) fn load(path: &Path) -> anyhow::Result<RunResult> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

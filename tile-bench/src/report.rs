//! Text reports and scaling summaries over saved results.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use itertools::{EitherOrBoth, Itertools};
use tracing::{info, warn};

use crate::{
    engines::EngineKind,
    results::{self, RunParams, RunResult},
    ShowArgs, SummaryArgs,
};

/// File prefix of the warmup passes `suite` runs, left out of summaries.
pub(crate) const WARMUP_PREFIX: &str = "WMP";

const RULE: &str = "-------------------------------------------------------------";

/// A [`RunResult`] turned into the series the reports need. Times in ms,
/// failed files dropped.
#[derive(Debug, Clone)]
pub(crate) struct StatsResult {
    pub(crate) file: String,
    pub(crate) params: RunParams,
    pub(crate) chunk_size: Vec<u64>,
    pub(crate) t_open: Vec<f64>,
    pub(crate) t_read: Vec<f64>,
    pub(crate) t_total: Vec<f64>,
    pub(crate) header_fetches: Vec<usize>,
    /// Start of each file, the earliest at 0.
    pub(crate) t0: Vec<f64>,
    pub(crate) t_end: Vec<f64>,
    pub(crate) n_bad: usize,
    /// Wall time of the run, seconds.
    pub(crate) duration: f64,
    /// Median of `fps`.
    pub(crate) throughput: f64,
    pub(crate) throughput_max: f64,
    /// Completion times in seconds, sorted.
    pub(crate) fps_t: Vec<f64>,
    /// Files completed per second at each of `fps_t`.
    pub(crate) fps: Vec<f64>,
    pub(crate) result_hash: Option<String>,
}

impl std::fmt::Display for StatsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "x{} fps:{:.2} t:{:.1}s <{}>",
            self.params.nthreads, self.throughput, self.duration, self.file
        )
    }
}

/// Sorted completion times and the files-per-second reached at each.
pub(crate) fn files_per_second(t_end: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let tt: Vec<f64> = t_end.iter().copied().sorted_by(f64::total_cmp).collect();
    let fps = tt
        .iter()
        .enumerate()
        .map(|(i, t)| (i + 1) as f64 / t)
        .collect();
    (tt, fps)
}

pub(crate) fn unpack(result: &RunResult, file: impl Into<String>) -> StatsResult {
    let stats: Vec<_> = result.stats.iter().flatten().collect();
    let ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0;

    let chunk_size = stats.iter().map(|s| s.chunk_size).collect();
    let t_open: Vec<f64> = stats.iter().map(|s| ms(s.t_open)).collect();
    let t_total: Vec<f64> = stats.iter().map(|s| ms(s.t_total)).collect();
    let t_read = stats.iter().map(|s| ms(s.t_read())).collect();
    let header_fetches = stats.iter().map(|s| s.header_fetches).collect();

    let t0: Vec<f64> = stats.iter().map(|s| ms(s.t0)).collect();
    let t0_min = t0.iter().copied().fold(f64::INFINITY, f64::min);
    let t0: Vec<f64> = t0.iter().map(|t| t - t0_min).collect();
    let t_end: Vec<f64> = t0.iter().zip(&t_total).map(|(a, b)| a + b).collect();
    let t_end_secs: Vec<f64> = t_end.iter().map(|t| t / 1000.0).collect();
    let (fps_t, fps) = files_per_second(&t_end_secs);

    StatsResult {
        file: file.into(),
        params: result.params.clone(),
        chunk_size,
        t_open,
        t_read,
        t_total,
        header_fetches,
        t0,
        t_end,
        n_bad: result.stats.len() - stats.len(),
        duration: result.t_total.as_secs_f64(),
        throughput: median(&fps),
        throughput_max: fps.iter().copied().fold(0.0, f64::max),
        fps_t,
        fps,
        result_hash: result.result_hash.clone(),
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median, min and max.
fn spread(values: &[f64]) -> (f64, f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (median(values), min, max)
    }
}

/// Mean of `part[i] / total[i]` as a percentage.
fn share(part: &[f64], total: &[f64]) -> f64 {
    let ratios: Vec<f64> = part
        .iter()
        .zip(total)
        .filter(|(_, t)| **t > 0.0)
        .map(|(p, t)| p / t)
        .collect();
    if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64 * 100.0
    }
}

/// `1234567` as `1,234,567`.
pub(crate) fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn abbreviate_hash(hash: Option<&str>) -> String {
    match hash {
        Some(h) if h.len() > 40 => match (h.get(..32), h.get(h.len() - 8..)) {
            (Some(head), Some(tail)) => format!("{head}..{tail}"),
            _ => h.to_owned(),
        },
        Some(h) => h.to_owned(),
        None => "<no hash recorded>".to_owned(),
    }
}

pub(crate) fn gen_stats_report(xx: &StatsResult, extra_msg: Option<&str>) -> String {
    let pp = &xx.params;
    let blocks = match (pp.block_shape, pp.dtype) {
        (Some(shape), Some(dtype)) => format!("{shape}@{dtype}"),
        (Some(shape), None) => format!("{shape}@?"),
        (None, Some(dtype)) => format!("?@{dtype}"),
        (None, None) => "?".to_owned(),
    };
    let mut hdr = format!(
        "Tile: {}_{}#{}\n   - blocks  : {}\n   - nthreads: {}\n   - engine  : {}",
        pp.block.x, pp.block.y, pp.band, blocks, pp.nthreads, pp.engine
    );
    if let Some(msg) = extra_msg {
        hdr.push_str(&format!("\n   - {msg}"));
    }

    let failures = if xx.n_bad > 0 {
        format!("WARNING: {} datasets failed to load\n", xx.n_bad)
    } else {
        String::new()
    };

    let chunk_size: Vec<f64> = xx.chunk_size.iter().map(|&c| c as f64).collect();
    let (chunk_median, _, _) = spread(&chunk_size);
    let chunk_min = xx.chunk_size.iter().copied().min().unwrap_or(0);
    let chunk_max = xx.chunk_size.iter().copied().max().unwrap_or(0);
    let (total_med, total_min, total_max) = spread(&xx.t_total);
    let (open_med, open_min, open_max) = spread(&xx.t_open);
    let (read_med, read_min, read_max) = spread(&xx.t_read);
    let nthreads = pp.nthreads.max(1) as f64;

    format!(
        "{RULE}
{hdr}
{RULE}
  {hash}
{failures}
Files read             : {files}
Total data bytes       : {bytes}
  (excluding headers)
Bytes per chunk        : {chunk_median} [{chunk_min}..{chunk_max}]

 Time        Median Min          Max
 per tile  --------------------------
  - total   {total_med:7.3} [{total_min:.<6.1}..{total_max:.>7.1}] ms
  - open    {open_med:7.3} [{open_min:.<6.1}..{open_max:.>7.1}] ms {open_share:4.1}%
  - read    {read_med:7.3} [{read_min:.<6.1}..{read_max:.>7.1}] ms {read_share:4.1}%

total_wait: {total_wait:7.2} sec (across all threads)
walltime  : {walltime:7.2} sec
throughput: {throughput:6.1} tiles per second
            {per_thread:6.1} tiles per second per thread
peak      : {peak:6.1} tiles per second
{RULE}",
        hash = abbreviate_hash(xx.result_hash.as_deref()),
        files = thousands(xx.chunk_size.len() as u64),
        bytes = thousands(xx.chunk_size.iter().sum()),
        chunk_median = thousands(chunk_median as u64),
        chunk_min = thousands(chunk_min),
        chunk_max = thousands(chunk_max),
        open_share = share(&xx.t_open, &xx.t_total),
        read_share = share(&xx.t_read, &xx.t_total),
        total_wait = (xx.t_total.iter().sum::<f64>() * 1e-3).round(),
        walltime = xx.duration,
        throughput = xx.throughput,
        per_thread = xx.throughput / nthreads,
        peak = xx.throughput_max,
    )
}

/// Two reports side by side. Each side is cut to its longest non-rule line
/// and rule lines are redrawn across both.
pub(crate) fn join_reports(a: &str, b: &str) -> String {
    fn trim(s: &str) -> (Vec<String>, usize) {
        let lines: Vec<&str> = s.split('\n').collect();
        let nmax = lines
            .iter()
            .filter(|l| !l.starts_with("--"))
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        let lines = lines
            .iter()
            .map(|l| l.chars().take(nmax).collect())
            .collect();
        (lines, nmax)
    }

    let (left, nmax) = trim(a);
    let (right, _) = trim(b);
    left.iter()
        .zip_longest(&right)
        .map(|pair| {
            let (l, r) = match pair {
                EitherOrBoth::Both(l, r) => (l.as_str(), r.as_str()),
                EitherOrBoth::Left(l) => (l.as_str(), ""),
                EitherOrBoth::Right(r) => ("", r.as_str()),
            };
            let line = format!("{l:nmax$} | {r}");
            if line.starts_with("--") {
                "-".repeat(line.chars().count())
            } else {
                line
            }
        })
        .join("\n")
}

fn is_result_file(path: &Path, prefix: Option<&str>) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.contains("__")
        && name.ends_with(".json")
        && !name.starts_with(WARMUP_PREFIX)
        && prefix.map_or(true, |p| name.starts_with(p))
}

/// Every result file in `dir`, sorted by name. Unreadable ones are skipped.
pub(crate) fn load_results(dir: &Path, prefix: Option<&str>) -> anyhow::Result<Vec<StatsResult>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_result_file(p, prefix))
        .collect();
    files.sort();

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        match results::load(&path) {
            Ok(result) => out.push(unpack(&result, file_name(&path))),
            Err(e) => warn!("skipping {}: {e:#}", path.display()),
        }
    }
    Ok(out)
}

/// nthreads -> results with that many threads
pub(crate) fn group_by_threads(results: Vec<StatsResult>) -> BTreeMap<usize, Vec<StatsResult>> {
    let mut groups: BTreeMap<usize, Vec<StatsResult>> = BTreeMap::new();
    for r in results {
        groups.entry(r.params.nthreads).or_default().push(r);
    }
    groups
}

pub(crate) fn load_dir(dir: &Path, prefix: Option<&str>) -> anyhow::Result<BTreeMap<usize, Vec<StatsResult>>> {
    Ok(group_by_threads(load_results(dir, prefix)?))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum PickBy {
    /// Shortest wall time.
    Time,
    /// Highest median throughput.
    Throughput,
}

pub(crate) fn pick_best(
    groups: &BTreeMap<usize, Vec<StatsResult>>,
    by: PickBy,
) -> BTreeMap<usize, &StatsResult> {
    groups
        .iter()
        .filter_map(|(&n, results)| {
            let best = match by {
                PickBy::Time => results.iter().min_by(|a, b| a.duration.total_cmp(&b.duration)),
                PickBy::Throughput => results
                    .iter()
                    .max_by(|a, b| a.throughput.total_cmp(&b.throughput)),
            };
            best.map(|b| (n, b))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub(crate) struct ScalingRow {
    pub(crate) engine: EngineKind,
    pub(crate) threads: usize,
    pub(crate) time_secs: f64,
    pub(crate) files_per_sec: f64,
    /// Per-thread rate relative to the best per-thread rate.
    pub(crate) efficiency_pct: f64,
    /// Block bytes only.
    pub(crate) mib_per_sec: f64,
    pub(crate) median_fps: f64,
    pub(crate) peak_fps: f64,
    pub(crate) best: bool,
    pub(crate) file: String,
}

pub(crate) fn scaling(best: &BTreeMap<usize, &StatsResult>) -> Vec<ScalingRow> {
    let mut rows: Vec<ScalingRow> = best
        .iter()
        .map(|(&threads, s)| {
            let files = s.chunk_size.len() as f64;
            let bytes = s.chunk_size.iter().sum::<u64>() as f64;
            let (files_per_sec, mib_per_sec) = if s.duration > 0.0 {
                (files / s.duration, bytes / s.duration / (1 << 20) as f64)
            } else {
                (0.0, 0.0)
            };
            ScalingRow {
                engine: s.params.engine,
                threads,
                time_secs: s.duration,
                files_per_sec,
                efficiency_pct: 0.0,
                mib_per_sec,
                median_fps: s.throughput,
                peak_fps: s.throughput_max,
                best: false,
                file: s.file.clone(),
            }
        })
        .collect();

    let per_thread = |r: &ScalingRow| r.files_per_sec / r.threads.max(1) as f64;
    let max_per_thread = rows.iter().map(per_thread).fold(0.0, f64::max);
    let fastest = rows
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.time_secs.total_cmp(&b.time_secs))
        .map(|(i, _)| i);
    for (i, row) in rows.iter_mut().enumerate() {
        if max_per_thread > 0.0 {
            row.efficiency_pct = per_thread(row) / max_per_thread * 100.0;
        }
        row.best = Some(i) == fastest;
    }
    rows
}

pub(crate) fn render_scaling(rows: &[ScalingRow]) -> String {
    let mut out = String::from(
        "threads   time(s)   files/s   eff(%)    MiB/s  median fps  peak fps\n",
    );
    for r in rows {
        out.push_str(&format!(
            "{:7} {:9.3} {:9.1} {:8.1} {:8.2} {:11.1} {:9.1}{}\n",
            r.threads,
            r.time_secs,
            r.files_per_sec,
            r.efficiency_pct,
            r.mib_per_sec,
            r.median_fps,
            r.peak_fps,
            if r.best { "  <- best" } else { "" },
        ));
    }
    let best = |key: fn(&ScalingRow) -> f64| {
        rows.iter()
            .max_by(|a, b| key(a).total_cmp(&key(b)))
            .map(|r| (key(r), r.threads))
    };
    if let Some(r) = rows.iter().find(|r| r.best) {
        out.push_str(&format!("\n{:.3} secs using {} threads\n", r.time_secs, r.threads));
    }
    if let Some((fps, n)) = best(|r| r.files_per_sec) {
        out.push_str(&format!("{fps:.0} files/s using {n} threads\n"));
    }
    if let Some((mib, n)) = best(|r| r.mib_per_sec) {
        out.push_str(&format!("{mib:.1} MiB/s using {n} threads (excluding headers)\n"));
    }
    out
}

/// One file of a run, times in ms.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub(crate) struct TileRow {
    pub(crate) t0: f64,
    pub(crate) t_open: f64,
    pub(crate) t_read: f64,
    pub(crate) t_total: f64,
    pub(crate) t_end: f64,
    pub(crate) chunk_size: u64,
    pub(crate) header_fetches: usize,
}

/// One point of the files-per-second curve.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub(crate) struct FpsRow {
    pub(crate) t_secs: f64,
    pub(crate) fps: f64,
}

pub(crate) fn tile_rows(xx: &StatsResult) -> Vec<TileRow> {
    (0..xx.chunk_size.len())
        .map(|i| TileRow {
            t0: xx.t0[i],
            t_open: xx.t_open[i],
            t_read: xx.t_read[i],
            t_total: xx.t_total[i],
            t_end: xx.t_end[i],
            chunk_size: xx.chunk_size[i],
            header_fetches: xx.header_fetches[i],
        })
        .collect()
}

pub(crate) fn fps_rows(xx: &StatsResult) -> Vec<FpsRow> {
    xx.fps_t
        .iter()
        .zip(&xx.fps)
        .map(|(&t_secs, &fps)| FpsRow { t_secs, fps })
        .collect()
}

fn write_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("wrote {}", path.display());
    Ok(())
}

/// `{stem}.tiles.csv` and `{stem}.fps.csv` in `dir`, named after the result file.
pub(crate) fn export_run_csv(dir: &Path, xx: &StatsResult) -> anyhow::Result<()> {
    let stem = xx.file.strip_suffix(".json").unwrap_or(&xx.file);
    write_csv(&dir.join(format!("{stem}.tiles.csv")), &tile_rows(xx))?;
    write_csv(&dir.join(format!("{stem}.fps.csv")), &fps_rows(xx))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn show(args: &ShowArgs) -> anyhow::Result<()> {
    if let Some(dir) = &args.csv {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let mut reports = Vec::new();
    for path in &args.files {
        let result = results::load(path)?;
        let name = file_name(path);
        let stats = unpack(&result, name.clone());
        if let Some(dir) = &args.csv {
            export_run_csv(dir, &stats)?;
        }
        reports.push(gen_stats_report(&stats, Some(&name)));
        if args.warmup {
            match &result.warmup {
                Some(warmup) => reports.push(gen_stats_report(
                    &unpack(warmup, name.clone()),
                    Some(&format!("warmup of {name}")),
                )),
                None => info!("{name}: no warmup recorded"),
            }
        }
    }
    match &reports[..] {
        [a, b] => println!("{}", join_reports(a, b)),
        _ => {
            for report in &reports {
                println!("{report}\n");
            }
        }
    }
    Ok(())
}

pub(crate) fn summary(args: &SummaryArgs) -> anyhow::Result<()> {
    let groups = load_dir(&args.dir, args.prefix.as_deref())?;
    if groups.is_empty() {
        bail!("no results in {}", args.dir.display());
    }
    // engines are summarized separately
    let mut by_engine: BTreeMap<String, BTreeMap<usize, Vec<StatsResult>>> = BTreeMap::new();
    for (n, results) in groups {
        for r in results {
            by_engine
                .entry(r.params.engine.to_string())
                .or_default()
                .entry(n)
                .or_default()
                .push(r);
        }
    }

    let mut csv_rows: Vec<ScalingRow> = Vec::new();
    for (engine, groups) in by_engine {
        let best = pick_best(&groups, args.by);
        let rows = scaling(&best);
        println!("engine: {engine}");
        println!("{}", render_scaling(&rows));
        if args.reports {
            for s in best.values() {
                println!("{}\n", gen_stats_report(s, Some(&s.file)));
            }
        }
        csv_rows.extend(rows);
    }

    if let Some(path) = &args.csv {
        write_csv(path, &csv_rows)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::results::{tests::params, TileStat};

    fn stat(t0_ms: u64, open_ms: u64, total_ms: u64, chunk_size: u64) -> Option<TileStat> {
        Some(TileStat {
            t0: Duration::from_millis(t0_ms),
            t_open: Duration::from_millis(open_ms),
            t_total: Duration::from_millis(total_ms),
            chunk_size,
            header_fetches: 1,
        })
    }

    fn run_result(nthreads: usize, wall_ms: u64) -> RunResult {
        RunResult {
            params: params(nthreads),
            stats: vec![
                stat(100, 10, 400, 1000),
                stat(100, 20, 900, 3000),
                None,
                stat(600, 100, 400, 2000),
            ],
            failures: Vec::new(),
            t_total: Duration::from_millis(wall_ms),
            result_hash: Some("0123456789abcdef".repeat(4)),
            progress: Vec::new(),
            client_run_times: Vec::new(),
            warmup: None,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fps_curve() {
        let (tt, fps) = files_per_second(&[2.0, 0.5, 1.0]);
        assert_eq!(tt, vec![0.5, 1.0, 2.0]);
        assert_eq!(fps, vec![2.0, 2.0, 1.5]);
        assert_eq!(median(&[3.0, 1.0, 2.0, 10.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn unpacks_stats() {
        let s = unpack(&run_result(2, 1100), "a.json");
        assert_eq!(s.n_bad, 1);
        assert_eq!(s.chunk_size, vec![1000, 3000, 2000]);
        assert!(close(s.t0[0], 0.0) && close(s.t0[2], 500.0));
        // ends at 0.4, 0.9, 0.9 seconds
        assert!(close(s.t_end[2], 900.0));
        assert!(close(s.t_read[1], 880.0));
        assert!(close(s.fps[0], 1.0 / 0.4));
        assert!(close(s.fps[2], 3.0 / 0.9));
        assert!(close(s.throughput, 2.0 / 0.9));
        assert!(close(s.throughput_max, 3.0 / 0.9));
        assert!(close(s.duration, 1.1));
        assert_eq!(s.header_fetches, vec![1, 1, 1]);
        assert_eq!(s.to_string(), "x2 fps:2.22 t:1.1s <a.json>");
    }

    #[test]
    fn odd_hashes_are_printed_whole() {
        let euros = "\u{20ac}".repeat(20);
        assert_eq!(abbreviate_hash(Some(&euros)), euros);
        assert_eq!(abbreviate_hash(Some("abc")), "abc");
        assert_eq!(abbreviate_hash(None), "<no hash recorded>");
    }

    #[test]
    fn report_layout() {
        let s = unpack(&run_result(2, 1100), "a.json");
        let report = gen_stats_report(&s, Some("a.json"));
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], RULE);
        assert_eq!(lines[1], "Tile: 7_7#1");
        assert_eq!(lines[2], "   - blocks  : 512x512@uint16");
        assert_eq!(lines[3], "   - nthreads: 2");
        assert_eq!(lines[4], "   - engine  : std-thread");
        assert_eq!(lines[5], "   - a.json");
        assert_eq!(lines[6], RULE);
        assert_eq!(lines[7], "  0123456789abcdef0123456789abcdef..89abcdef");
        assert_eq!(lines[8], "WARNING: 1 datasets failed to load");
        assert!(report.contains("Files read             : 3\n"));
        assert!(report.contains("Total data bytes       : 6,000\n"));
        assert!(report.contains("Bytes per chunk        : 2,000 [1,000..3,000]\n"));
        assert!(report.contains("  - total   400.000 [400.0.....900.0] ms"));
        assert!(report.contains("walltime  :    1.10 sec"));
        assert!(report.contains("throughput:    2.2 tiles per second"));
        assert!(report.contains("   1.1 tiles per second per thread"));
        assert!(report.contains("peak      :    3.3 tiles per second"));
        assert_eq!(*lines.last().unwrap(), RULE);
    }

    #[test]
    fn numbers_get_separators() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(12_345_678), "12,345,678");
    }

    #[test]
    fn joins_side_by_side() {
        let a = "----------\nleft\nlonger left\n----------";
        let b = "---\nr1\nr2\n---\nextra";
        let joined = join_reports(a, b);
        let lines: Vec<&str> = joined.lines().collect();
        assert_eq!(lines[0], "-".repeat("longer left | ---".len()));
        assert_eq!(lines[1], "left        | r1");
        assert_eq!(lines[2], "longer left | r2");
        assert_eq!(lines[3], "-".repeat("longer left | ---".len()));
        assert_eq!(lines[4], "            | extra");
    }

    #[test]
    fn picks_best_and_scales() {
        let mk = |n: usize, wall_ms: u64, name: &str| unpack(&run_result(n, wall_ms), name);
        let mut groups = BTreeMap::new();
        groups.insert(1, vec![mk(1, 3000, "a"), mk(1, 2400, "b")]);
        groups.insert(4, vec![mk(4, 1200, "c"), mk(4, 900, "d")]);

        let best = pick_best(&groups, PickBy::Time);
        assert_eq!(best[&1].file, "b");
        assert_eq!(best[&4].file, "d");

        let rows = scaling(&best);
        assert_eq!(rows.len(), 2);
        // 3 files in 2.4s on one thread, 3 files in 0.9s on four
        assert!(close(rows[0].files_per_sec, 3.0 / 2.4));
        assert!(close(rows[0].efficiency_pct, 100.0));
        assert!(close(rows[1].efficiency_pct, (3.0 / 0.9 / 4.0) / (3.0 / 2.4) * 100.0));
        assert!(!rows[0].best && rows[1].best);
        assert!(close(rows[1].mib_per_sec, 6000.0 / 0.9 / (1 << 20) as f64));

        let text = render_scaling(&rows);
        assert!(text.contains("<- best"));
        assert!(text.contains("0.900 secs using 4 threads"));
    }

    /// `result` with every file starting and taking `factor` times as long.
    fn slowed(mut result: RunResult, factor: u32) -> RunResult {
        for stat in result.stats.iter_mut().flatten() {
            stat.t0 *= factor;
            stat.t_total *= factor;
        }
        result
    }

    #[test]
    fn time_and_throughput_pick_differently() {
        // "quick" finishes first but its files complete slowly, "steady" the reverse
        let quick = unpack(&slowed(run_result(2, 1000), 2), "quick");
        let steady = unpack(&run_result(2, 2000), "steady");
        assert!(quick.duration < steady.duration);
        assert!(quick.throughput < steady.throughput);

        let mut groups = BTreeMap::new();
        groups.insert(2, vec![quick.clone(), steady.clone()]);
        groups.insert(8, vec![steady, quick]);
        for n in [2, 8] {
            assert_eq!(pick_best(&groups, PickBy::Time)[&n].file, "quick");
            assert_eq!(pick_best(&groups, PickBy::Throughput)[&n].file, "steady");
        }
    }

    #[test]
    fn run_csv_has_tiles_and_fps_curve() {
        let dir = tempfile::tempdir().unwrap();
        let s = unpack(&run_result(2, 1100), "STD_b7_7B1__02_001.json");
        export_run_csv(dir.path(), &s).unwrap();

        let tiles = std::fs::read_to_string(dir.path().join("STD_b7_7B1__02_001.tiles.csv")).unwrap();
        let lines: Vec<&str> = tiles.lines().collect();
        assert_eq!(
            lines[0],
            "t0,t_open,t_read,t_total,t_end,chunk_size,header_fetches"
        );
        assert_eq!(lines.len(), 4);
        let fields = |line: &str| -> Vec<f64> {
            line.split(',').map(|v| v.parse().unwrap()).collect()
        };
        let last = fields(lines[3]);
        let expected = [500.0, 100.0, 300.0, 400.0, 900.0, 2000.0, 1.0];
        assert!(last.iter().zip(expected).all(|(a, b)| (a - b).abs() < 1e-6));

        let fps = std::fs::read_to_string(dir.path().join("STD_b7_7B1__02_001.fps.csv")).unwrap();
        let lines: Vec<&str> = fps.lines().collect();
        assert_eq!(lines[0], "t_secs,fps");
        assert_eq!(lines.len(), 4);
        let first = fields(lines[1]);
        assert!(close(first[0], 0.4) && (first[1] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn show_exports_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rio_b7_7B1__02_001.json");
        results::save(&path, &run_result(2, 1100)).unwrap();
        let out = dir.path().join("csv");
        show(&ShowArgs {
            files: vec![path],
            warmup: true,
            csv: Some(out.clone()),
        })
        .unwrap();
        assert!(out.join("rio_b7_7B1__02_001.tiles.csv").exists());
        assert!(out.join("rio_b7_7B1__02_001.fps.csv").exists());
    }

    #[test]
    fn loads_result_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let save = |name: &str, n: usize| {
            results::save(&dir.path().join(name), &run_result(n, 1000)).unwrap();
        };
        save("STD_b7_7B1__01_001.json", 1);
        save("STD_b7_7B1__04_001.json", 4);
        save("STD_b7_7B1__04_002.json", 4);
        save("TKA_b7_7B1__04_001.json", 4);
        save("WMP_b7_7B1__32_001.json", 32);
        save("notes.json", 1);
        std::fs::write(dir.path().join("STD_b7_7B1__08_001.json"), "garbage").unwrap();

        let groups = load_dir(dir.path(), None).unwrap();
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(groups[&4].len(), 3);
        assert_eq!(groups[&4][0].file, "STD_b7_7B1__04_001.json");

        let std_only = load_dir(dir.path(), Some("STD")).unwrap();
        assert_eq!(std_only[&4].len(), 2);
        assert!(load_dir(&dir.path().join("missing"), None).is_err());
    }

    #[test]
    fn summary_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = run_result(2, 1000);
        results::save(&dir.path().join("STD_b7_7B1__02_001.json"), &r).unwrap();
        r.params.engine = EngineKind::TokioAsync;
        results::save(&dir.path().join("TKA_b7_7B1__02_001.json"), &r).unwrap();

        let csv_path = dir.path().join("scaling.csv");
        summary(&SummaryArgs {
            dir: dir.path().to_owned(),
            by: PickBy::Throughput,
            prefix: None,
            csv: Some(csv_path.clone()),
            reports: false,
        })
        .unwrap();
        let csv = std::fs::read_to_string(csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("engine,threads,time_secs"));
        assert!(lines[1].starts_with("std-thread,2,"));
        assert!(lines[2].starts_with("tokio-async,2,"));
    }
}

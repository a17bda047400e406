use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use cog_range::{list::Filter, BlockIndex, BlockShape, BlockingReader, SampleType, SourceConfig};
use engines::EngineKind;
use report::PickBy;
use tracing::error;

mod config;
mod engines;
mod report;
mod results;
mod run;
mod stats;
mod suite;

/// Benchmark reading one block out of many cloud optimized GeoTIFFs.
#[derive(clap::Parser)]
#[clap(version)]
struct Cli {
    /// TOML config file. Defaults to ./tile-bench.toml when that exists.
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    source: config::SourceOverrides,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Read one block from every file listed in URL_FILE and save the timings.
    Run(RunArgs),
    /// Run a series of benchmarks over thread counts and engines.
    Suite(SuiteArgs),
    /// List files under an S3 prefix or a local directory.
    Ls(LsArgs),
    /// Print the report for saved results.
    Show(ShowArgs),
    /// Scaling table over a directory of saved results.
    Summary(SummaryArgs),
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct RunArgs {
    /// Prefix for the results file.
    #[clap(long, default_value = "rio")]
    pub(crate) prefix: String,
    /// Block to read, as column,row.
    #[clap(long, default_value = "7,7")]
    pub(crate) block: BlockIndex,
    /// Band to read from, 1-based.
    #[clap(long, default_value_t = 1)]
    pub(crate) band: u16,
    /// Expected pixel type, e.g. uint16. Files that differ count as failed.
    #[clap(long)]
    pub(crate) dtype: Option<SampleType>,
    /// Expected block shape, WxH. Files that differ count as failed.
    #[clap(long)]
    pub(crate) block_shape: Option<BlockShape>,
    /// Read one file per thread before recording (default).
    #[clap(long, overrides_with = "no_warmup_more")]
    pub(crate) warmup_more: bool,
    /// Skip the warmup reads.
    #[clap(long, overrides_with = "warmup_more")]
    pub(crate) no_warmup_more: bool,
    /// Number of concurrent clients.
    #[clap(short = 'n', long, default_value = "1")]
    pub(crate) threads: NonZeroUsize,
    #[clap(long, value_enum, default_value_t = EngineKind::StdThread)]
    pub(crate) engine: EngineKind,
    /// Also save the raw block bytes next to the results.
    #[clap(long)]
    pub(crate) save_chunks: bool,
    #[clap(long, default_value = ".")]
    pub(crate) output_dir: PathBuf,
    /// File with one URL per line.
    pub(crate) url_file: PathBuf,
}

impl RunArgs {
    pub(crate) fn warmup(&self) -> bool {
        self.warmup_more || !self.no_warmup_more
    }
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct SuiteArgs {
    /// File with one URL per line.
    pub(crate) url_file: PathBuf,
    #[clap(long, value_delimiter = ',', default_value = "1,2,4,8,16,20,24,28,32,38")]
    pub(crate) threads: Vec<NonZeroUsize>,
    #[clap(long, value_enum, value_delimiter = ',', default_value = "std-thread,tokio-async")]
    pub(crate) engines: Vec<EngineKind>,
    /// Repetitions of every configuration.
    #[clap(long, default_value_t = 1)]
    pub(crate) times: usize,
    /// Full passes over the files before measuring, results saved with prefix WMP.
    #[clap(long, default_value_t = 1)]
    pub(crate) warmup_passes: usize,
    #[clap(long, overrides_with = "no_warmup_more")]
    pub(crate) warmup_more: bool,
    #[clap(long, overrides_with = "warmup_more")]
    pub(crate) no_warmup_more: bool,
    #[clap(long, default_value = "7,7")]
    pub(crate) block: BlockIndex,
    #[clap(long, default_value_t = 1)]
    pub(crate) band: u16,
}

impl SuiteArgs {
    pub(crate) fn warmup(&self) -> bool {
        self.warmup_more || !self.no_warmup_more
    }
}

#[derive(clap::Args, Clone, Debug)]
struct LsArgs {
    /// s3://bucket/prefix or a local directory.
    prefix: String,
    /// Keep URLs matching this shell pattern, e.g. '*_B1.TIF'.
    #[clap(long, conflicts_with = "regex")]
    filter: Option<String>,
    /// Keep URLs containing a match of this regular expression.
    #[clap(long)]
    regex: Option<String>,
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct ShowArgs {
    #[clap(required = true)]
    pub(crate) files: Vec<PathBuf>,
    /// Also print the warmup recorded with each result.
    #[clap(long)]
    pub(crate) warmup: bool,
    /// Write per-file timings and the files-per-second curve of each result
    /// as CSV into this directory.
    #[clap(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(clap::Args, Clone, Debug)]
pub(crate) struct SummaryArgs {
    #[clap(default_value = ".")]
    pub(crate) dir: PathBuf,
    #[clap(long, value_enum, default_value_t = PickBy::Time)]
    pub(crate) by: PickBy,
    /// Only results whose file name starts with this.
    #[clap(long)]
    pub(crate) prefix: Option<String>,
    /// Write the scaling rows to this CSV file.
    #[clap(long)]
    pub(crate) csv: Option<PathBuf>,
    /// Print the full report of every picked result.
    #[clap(long)]
    pub(crate) reports: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .with_env_filter({
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        })
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config: config_path,
        source: overrides,
        command,
    } = cli;
    let source_config = || -> anyhow::Result<SourceConfig> {
        config::Config::load(config_path.as_deref())?.source_config(&overrides)
    };
    match command {
        Command::Run(args) => run::run_main(args, source_config()?),
        Command::Suite(args) => suite::run_suite(&args, config_path.as_deref(), &overrides),
        Command::Ls(args) => ls(&args, source_config()?),
        Command::Show(args) => report::show(&args),
        Command::Summary(args) => report::summary(&args),
    }
}

fn ls(args: &LsArgs, source: SourceConfig) -> anyhow::Result<()> {
    let filter = match (&args.filter, &args.regex) {
        (Some(glob), _) => Some(Filter::glob(glob)?),
        (None, Some(re)) => Some(Filter::regex(re)?),
        (None, None) => None,
    };
    let reader = BlockingReader::new(source)?;
    for url in reader.list(&args.prefix, filter.as_ref())? {
        println!("{url}");
    }
    Ok(())
}

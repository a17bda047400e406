use std::{
    ffi::OsString,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{bail, Context};
use tracing::info;

use crate::{
    config::{Config, SourceOverrides},
    engines::EngineKind,
    report::WARMUP_PREFIX,
    SuiteArgs,
};

const URLS_FILE: &str = "urls.txt";
const WARMUP_THREADS: usize = 32;

/// One `tile-bench run` the suite spawns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) prefix: String,
    pub(crate) engine: EngineKind,
    pub(crate) threads: NonZeroUsize,
}

/// Warmup passes first, then every thread count, engine and repetition.
pub(crate) fn plan(args: &SuiteArgs) -> Vec<Step> {
    let mut steps = Vec::new();
    if let Some(&engine) = args.engines.first() {
        for _ in 0..args.warmup_passes {
            steps.push(Step {
                prefix: WARMUP_PREFIX.to_owned(),
                engine,
                threads: NonZeroUsize::new(WARMUP_THREADS).unwrap_or(NonZeroUsize::MIN),
            });
        }
    }
    for &threads in &args.threads {
        for &engine in &args.engines {
            for _ in 0..args.times {
                steps.push(Step {
                    prefix: engine.prefix().to_owned(),
                    engine,
                    threads,
                });
            }
        }
    }
    steps
}

/// Arguments of the child process, relative to the output directory.
pub(crate) fn run_args(
    step: &Step,
    args: &SuiteArgs,
    config: Option<&Path>,
    overrides: &SourceOverrides,
) -> Vec<OsString> {
    let mut out: Vec<OsString> = Vec::new();
    if let Some(config) = config {
        out.push("--config".into());
        out.push(config.into());
    }
    out.extend(overrides.to_args());
    out.push("run".into());
    for (flag, value) in [
        ("--prefix", step.prefix.clone()),
        ("--engine", step.engine.to_string()),
        ("--threads", step.threads.to_string()),
        ("--block", args.block.to_string()),
        ("--band", args.band.to_string()),
        ("--output-dir", ".".to_owned()),
    ] {
        out.push(flag.into());
        out.push(value.into());
    }
    if !args.warmup() {
        out.push("--no-warmup-more".into());
    }
    out.push(URLS_FILE.into());
    out
}

/// Absolute path of the config file a run started in `cwd` would read.
/// Children run elsewhere and get it passed explicitly.
fn child_config(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Option<PathBuf>> {
    Config::resolve_path(explicit, cwd)
        .map(|c| {
            c.canonicalize()
                .with_context(|| format!("config {}", c.display()))
        })
        .transpose()
}

/// `YYYY-MM-DDTHHMM` in local time.
fn out_dir_name() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H%M").to_string()
}

pub(crate) fn run_suite(
    args: &SuiteArgs,
    config: Option<&Path>,
    overrides: &SourceOverrides,
) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(out_dir_name());
    if out_dir.exists() {
        bail!("output directory {} already exists", out_dir.display());
    }
    let config = child_config(config, Path::new("."))?;
    std::fs::create_dir(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    std::fs::copy(&args.url_file, out_dir.join(URLS_FILE))
        .with_context(|| format!("copy {}", args.url_file.display()))?;

    let exe = std::env::current_exe().context("locate tile-bench executable")?;
    let steps = plan(args);
    info!("running {} benchmarks into {}", steps.len(), out_dir.display());
    for (i, step) in steps.iter().enumerate() {
        info!(
            "[{}/{}] {} with {} threads",
            i + 1,
            steps.len(),
            step.engine,
            step.threads
        );
        let status = Command::new(&exe)
            .args(run_args(step, args, config.as_deref(), overrides))
            .current_dir(&out_dir)
            .status()
            .with_context(|| format!("spawn {}", exe.display()))?;
        if !status.success() {
            bail!("benchmark {} with {} threads failed: {status}", step.engine, step.threads);
        }
    }
    info!("results are in {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(clap::Parser)]
    struct Wrapper {
        #[clap(flatten)]
        suite: SuiteArgs,
    }

    fn suite_args(extra: &[&str]) -> SuiteArgs {
        let mut argv = vec!["suite"];
        argv.extend_from_slice(extra);
        argv.push("urls.txt");
        Wrapper::parse_from(argv).suite
    }

    #[test]
    fn plan_order() {
        let args = suite_args(&["--threads", "1,8", "--times", "2", "--warmup-passes", "1"]);
        let steps = plan(&args);
        let summary: Vec<(String, usize)> = steps
            .iter()
            .map(|s| (s.prefix.clone(), s.threads.get()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("WMP".to_owned(), 32),
                ("STD".to_owned(), 1),
                ("STD".to_owned(), 1),
                ("TKA".to_owned(), 1),
                ("TKA".to_owned(), 1),
                ("STD".to_owned(), 8),
                ("STD".to_owned(), 8),
                ("TKA".to_owned(), 8),
                ("TKA".to_owned(), 8),
            ]
        );
        assert_eq!(steps[0].engine, EngineKind::StdThread);
    }

    #[test]
    fn child_arguments() {
        let args = suite_args(&["--no-warmup-more", "--block", "3,4"]);
        let step = Step {
            prefix: "TKA".to_owned(),
            engine: EngineKind::TokioAsync,
            threads: NonZeroUsize::new(16).unwrap(),
        };
        let overrides = SourceOverrides {
            region: Some("us-east-1".to_owned()),
            ..SourceOverrides::default()
        };
        let argv: Vec<String> = run_args(&step, &args, Some(Path::new("/etc/tb.toml")), &overrides)
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            argv.join(" "),
            "--config /etc/tb.toml --region us-east-1 run --prefix TKA --engine tokio-async \
             --threads 16 --block 3,4 --band 1 --output-dir . --no-warmup-more urls.txt"
        );
    }

    #[test]
    fn children_get_the_default_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(child_config(None, dir.path()).unwrap(), None);

        std::fs::write(dir.path().join("tile-bench.toml"), "[source]\n").unwrap();
        let config = child_config(None, dir.path()).unwrap().unwrap();
        assert!(config.is_absolute());
        assert!(config.ends_with("tile-bench.toml"));

        let args = suite_args(&[]);
        let step = plan(&args).remove(0);
        let argv = run_args(&step, &args, Some(&config), &SourceOverrides::default());
        assert_eq!(argv[0], OsString::from("--config"));
        assert_eq!(argv[1], config.clone().into_os_string());

        assert!(child_config(Some(&dir.path().join("missing.toml")), dir.path()).is_err());
    }

    #[test]
    fn dir_name_format() {
        let name = out_dir_name();
        assert_eq!(name.len(), "2024-01-31T1259".len());
        assert_eq!(&name[10..11], "T");
    }
}

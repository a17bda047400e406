use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use cog_range::SourceConfig;
use tracing::debug;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "tile-bench.toml";

#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) source: SourceSection,
}

/// The `[source]` table. Unset keys keep the reader defaults.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SourceSection {
    pub(crate) region: Option<String>,
    pub(crate) endpoint: Option<String>,
    pub(crate) header_bytes: Option<u64>,
    pub(crate) max_header_bytes: Option<u64>,
    /// humantime, e.g. `30s`
    pub(crate) timeout: Option<String>,
    pub(crate) user_agent: Option<String>,
}

/// Command line settings that win over the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct SourceOverrides {
    /// AWS region of the buckets.
    #[clap(long, global = true)]
    pub(crate) region: Option<String>,
    /// S3 compatible endpoint, addressed path-style.
    #[clap(long, global = true)]
    pub(crate) endpoint: Option<String>,
    /// Size of the first header fetch per file.
    #[clap(long, global = true)]
    pub(crate) header_bytes: Option<u64>,
}

impl SourceOverrides {
    /// The same overrides as command line arguments, for child processes.
    pub(crate) fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(region) = &self.region {
            args.push("--region".into());
            args.push(region.into());
        }
        if let Some(endpoint) = &self.endpoint {
            args.push("--endpoint".into());
            args.push(endpoint.into());
        }
        if let Some(header_bytes) = self.header_bytes {
            args.push("--header-bytes".into());
            args.push(header_bytes.to_string().into());
        }
        args
    }
}

impl Config {
    /// The file [`Config::load`] reads when started in `dir`: `path`, or
    /// `dir/tile-bench.toml` if present.
    pub(crate) fn resolve_path(path: Option<&Path>, dir: &Path) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_owned()),
            None => Some(dir.join(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        }
    }

    /// `path`, or `./tile-bench.toml` if present, or defaults.
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match Self::resolve_path(path, Path::new(".")) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        debug!("loading config from {path:?}");
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub(crate) fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub(crate) fn source_config(&self, overrides: &SourceOverrides) -> anyhow::Result<SourceConfig> {
        let section = &self.source;
        let mut config = SourceConfig {
            user_agent: concat!("tile-bench/", env!("CARGO_PKG_VERSION")).to_owned(),
            ..SourceConfig::default()
        };
        if let Some(region) = overrides.region.as_ref().or(section.region.as_ref()) {
            config.region = region.clone();
        }
        if let Some(endpoint) = overrides.endpoint.as_ref().or(section.endpoint.as_ref()) {
            config.endpoint =
                Some(Url::parse(endpoint).with_context(|| format!("invalid endpoint {endpoint:?}"))?);
        }
        if let Some(n) = overrides.header_bytes.or(section.header_bytes) {
            config.header_bytes = n;
        }
        if let Some(n) = section.max_header_bytes {
            config.max_header_bytes = n;
        }
        if let Some(timeout) = &section.timeout {
            config.timeout = humantime::parse_duration(timeout)
                .with_context(|| format!("invalid timeout {timeout:?}"))?;
        }
        if let Some(user_agent) = &section.user_agent {
            config.user_agent = user_agent.clone();
        }
        if config.header_bytes == 0 {
            bail!("header_bytes must be positive");
        }
        if config.max_header_bytes < config.header_bytes {
            bail!(
                "max_header_bytes ({}) is below header_bytes ({})",
                config.max_header_bytes,
                config.header_bytes
            );
        }
        Ok(config)
    }
}

use std::time::Duration;

use url::Url;

const DEFAULT_REGION: &str = "us-west-2";

/// How readers reach their sources.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// AWS region used to build virtual-hosted S3 URLs.
    pub region: String,
    /// Path-style S3 endpoint, e.g. a local minio. Overrides `region`.
    pub endpoint: Option<Url>,
    /// Size of the first header fetch.
    pub header_bytes: u64,
    /// Give up on files whose header does not fit in this many bytes.
    pub max_header_bytes: u64,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            header_bytes: 16 << 10,
            max_header_bytes: 16 << 20,
            timeout: Duration::from_secs(30),
            user_agent: concat!("cog-range/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// `AWS_REGION`, then `AWS_DEFAULT_REGION`, then `us-west-2`.
pub fn default_region() -> String {
    ["AWS_REGION", "AWS_DEFAULT_REGION"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_REGION.to_owned())
}

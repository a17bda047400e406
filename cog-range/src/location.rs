use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use url::Url;

use crate::{Error, Result, SourceConfig};

/// Where a file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String, key: String },
    Http(Url),
    File(PathBuf),
}

/// A location resolved against a [`SourceConfig`], ready to be read from.
pub(crate) enum Target<'a> {
    Http(Url),
    File(&'a Path),
}

impl Location {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidLocation("empty string".to_owned()));
        }
        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = split_s3(rest);
            if bucket.is_empty() || key.is_empty() {
                return Err(Error::InvalidLocation(format!(
                    "{s}: expected s3://bucket/key"
                )));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s).map_err(|e| Error::InvalidLocation(format!("{s}: {e}")))?;
            return Ok(Location::Http(url));
        }
        if s.starts_with("file://") {
            let path = Url::parse(s)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| Error::InvalidLocation(format!("{s}: not a local file url")))?;
            return Ok(Location::File(path));
        }
        Ok(Location::File(PathBuf::from(s)))
    }

    pub(crate) fn resolve(&self, config: &SourceConfig) -> Result<Target<'_>> {
        match self {
            Location::S3 { bucket, key } => Ok(Target::Http(s3_object_url(config, bucket, key)?)),
            Location::Http(url) => Ok(Target::Http(url.clone())),
            Location::File(path) => Ok(Target::File(path)),
        }
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Location::Http(url) => write!(f, "{url}"),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `bucket/some/key` -> (`bucket`, `some/key`)
pub(crate) fn split_s3(rest: &str) -> (&str, &str) {
    rest.split_once('/').unwrap_or((rest, ""))
}

/// Base URL of a bucket, with a trailing slash.
pub(crate) fn s3_bucket_url(config: &SourceConfig, bucket: &str) -> Result<Url> {
    let mut url = match &config.endpoint {
        Some(endpoint) => {
            let mut url = endpoint.clone();
            url.path_segments_mut()
                .map_err(|()| Error::InvalidLocation(format!("{endpoint}: cannot be a base")))?
                .pop_if_empty()
                .push(bucket);
            url
        }
        None => {
            let host = format!("https://{bucket}.s3.{}.amazonaws.com/", config.region);
            Url::parse(&host).map_err(|e| Error::InvalidLocation(format!("{host}: {e}")))?
        }
    };
    url.path_segments_mut()
        .map_err(|()| Error::InvalidLocation(format!("s3://{bucket}: cannot be a base")))?
        .pop_if_empty()
        .push("");
    Ok(url)
}

pub(crate) fn s3_object_url(config: &SourceConfig, bucket: &str, key: &str) -> Result<Url> {
    let mut url = s3_bucket_url(config, bucket)?;
    url.path_segments_mut()
        .map_err(|()| Error::InvalidLocation(format!("s3://{bucket}/{key}: cannot be a base")))?
        .pop_if_empty()
        .extend(key.split('/'));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> SourceConfig {
        SourceConfig {
            region: "ap-southeast-2".to_owned(),
            endpoint: endpoint.map(|e| Url::parse(e).unwrap()),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn parse_s3() {
        let loc = Location::parse("s3://landsat-pds/c1/L8/B1.TIF").unwrap();
        assert_eq!(
            loc,
            Location::S3 {
                bucket: "landsat-pds".to_owned(),
                key: "c1/L8/B1.TIF".to_owned()
            }
        );
        assert_eq!(loc.to_string(), "s3://landsat-pds/c1/L8/B1.TIF");
    }

    #[test]
    fn parse_rejects_bucket_only() {
        assert!(matches!(
            Location::parse("s3://landsat-pds"),
            Err(Error::InvalidLocation(_))
        ));
        assert!(matches!(
            Location::parse("s3://landsat-pds/"),
            Err(Error::InvalidLocation(_))
        ));
        assert!(Location::parse("   ").is_err());
    }

    #[test]
    fn parse_http_and_files() {
        assert!(matches!(
            Location::parse("https://example.com/a.tif").unwrap(),
            Location::Http(_)
        ));
        assert_eq!(
            Location::parse("file:///data/a.tif").unwrap(),
            Location::File(PathBuf::from("/data/a.tif"))
        );
        assert_eq!(
            Location::parse(" data/a.tif\n").unwrap(),
            Location::File(PathBuf::from("data/a.tif"))
        );
    }

    #[test]
    fn s3_virtual_hosted_url() {
        let url = s3_object_url(&config(None), "landsat-pds", "c1/L8/106/B1.TIF").unwrap();
        assert_eq!(
            url.as_str(),
            "https://landsat-pds.s3.ap-southeast-2.amazonaws.com/c1/L8/106/B1.TIF"
        );
    }

    #[test]
    fn s3_endpoint_is_path_style() {
        let cfg = config(Some("http://localhost:9000"));
        let url = s3_object_url(&cfg, "bucket", "dir/x y.tif").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/bucket/dir/x%20y.tif");
        let base = s3_bucket_url(&cfg, "bucket").unwrap();
        assert_eq!(base.as_str(), "http://localhost:9000/bucket/");
    }
}
